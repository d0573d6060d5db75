use std::sync::Arc;

use application::{ChatHub, PhoneVerificationService};
use config::WebSocketConfig;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ChatHub>,
    pub verification: Arc<PhoneVerificationService>,
    pub websocket: WebSocketConfig,
}

impl AppState {
    pub fn new(
        hub: Arc<ChatHub>,
        verification: Arc<PhoneVerificationService>,
        websocket: WebSocketConfig,
    ) -> Self {
        Self {
            hub,
            verification,
            websocket,
        }
    }
}
