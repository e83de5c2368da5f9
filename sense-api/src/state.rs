use std::sync::Arc;

use sense_broker::RegistrationChannel;
use sensedb::Store;

/// Shared by every handler. Both members are cheap handles, so the state
/// is cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub channel: Arc<dyn RegistrationChannel>,
}

impl AppState {
    pub fn new(store: Store, channel: Arc<dyn RegistrationChannel>) -> Self {
        Self { store, channel }
    }
}
