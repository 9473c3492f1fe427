pub mod capability;
pub mod handlers;
pub mod jobs;
pub mod media;
pub mod middleware;
pub mod routes;
pub mod ws;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use ws::{spawn_event_relay, spawn_heartbeat, WsBroadcaster, WsMessage};
