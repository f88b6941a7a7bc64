pub mod auth;
pub mod chat_task;
pub mod conversations;
pub mod events;
pub mod feedback;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod profile;
pub mod protocol;
pub mod rest;
pub mod router;
pub mod state;
pub mod ws_handler;

// Re-export the pieces the binaries need to assemble the server.
pub use middleware::require_auth;
pub use router::build_router;
pub use ws_handler::ws_handler;
