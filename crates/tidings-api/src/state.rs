use std::sync::Arc;

use tidings_gateway::{Notifier, RecentDeliveries};
use tidings_store::ChannelStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub notifier: Arc<Notifier>,
    pub store: Arc<ChannelStore>,
    pub deliveries: Arc<RecentDeliveries>,
}
