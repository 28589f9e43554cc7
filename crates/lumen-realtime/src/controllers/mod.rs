//! HTTP and WebSocket controllers.

pub mod health_controller;
pub mod jobs_controller;
pub mod ws_controller;
