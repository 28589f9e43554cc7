//! # Lumen Realtime
//!
//! Pushes job status changes to the owner's open sessions over WebSockets,
//! and serves the small HTTP API that submits and lists jobs.
//!
//! Every connection is authenticated before the upgrade and joined to the
//! room of the owner its token names. A [`RelayHandler`] subscribed to the
//! event bus hands each event to [`Gateway::relay`], which writes only into
//! that event's room.

pub mod controllers;
pub mod error;
pub mod extractors;
pub mod gateway;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;

pub use error::GatewayError;
pub use gateway::{
    extract_credential, start_heartbeat, Gateway, JwtSessionAuthenticator, RelayHandler,
    ServerMessage, Session, SessionAuthenticator,
};
pub use router::create_router;
pub use state::AppState;
