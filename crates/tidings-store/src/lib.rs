pub mod chain_head;
pub mod entry;
pub mod error;
pub mod log;
pub mod store;

pub use chain_head::ChainHeadFile;
pub use entry::{EntryParseError, FIELD_SEPARATOR, LogEntry};
pub use error::{Result, StoreError};
pub use log::{ChangeLog, FileLog, MemoryLog, ReplayStats};
pub use store::ChannelStore;
