pub mod api;
pub mod delivery;
pub mod envelope;
pub mod events;
pub mod identity;

pub use delivery::{ChainVerification, DeliveryOutcome, DeliveryStatus, DispatchReport};
pub use envelope::{EnvelopeBody, NotificationEnvelope};
pub use identity::{ChannelIdentity, IdentityKind, LookupKey};
