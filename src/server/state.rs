use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub hub: Arc<Hub>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let hub = Arc::new(Hub::new(settings.websocket.hub_config()));

        Self {
            settings: Arc::new(settings),
            hub,
            start_time: Instant::now(),
        }
    }
}
