/// Notification distribution: batching payloads into hash-chained
/// envelopes, resolving destinations through the channel store and handing
/// envelopes to delivery channels.

pub mod channels;
pub mod connection;
pub mod feed;
pub mod inbound;
pub mod notifier;
pub mod observer;

pub use channels::{DeliveryChannel, DeliveryError, Route};
pub use feed::EnvelopeFeed;
pub use notifier::{Notifier, NotifierBuilder, NotifierError, run_notify_loop};
pub use observer::{DeliveryObserver, NullObserver, RecentDeliveries, TracingObserver};
