//! # Lumen Core
//!
//! Core types, the thumbnail job domain model, and error definitions shared
//! by every Lumen crate.

pub mod domain;
pub mod error;
pub mod id;
pub mod result;
pub mod telemetry;

pub use domain::*;
pub use error::*;
pub use id::*;
pub use result::*;
