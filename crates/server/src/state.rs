use convertino_core::{Config, JobQueue};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    queue: JobQueue,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(queue: JobQueue, ws_broadcaster: WsBroadcaster) -> Self {
        Self {
            queue,
            ws_broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        self.queue.config()
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
