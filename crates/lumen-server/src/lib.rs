//! # Lumen Server Library
//!
//! Wiring and process lifecycle for the Lumen server. One binary serves
//! every role: `all` runs workers and the realtime gateway together,
//! `worker` and `gateway` split them across processes that share Redis.

pub mod app;
pub mod di;
pub mod metrics;
pub mod startup;
