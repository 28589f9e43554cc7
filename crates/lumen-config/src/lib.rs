//! # Lumen Config
//!
//! Layered configuration for Lumen: TOML files, `.env`, and `LUMEN_`
//! environment variables, validated at load time.

mod app_config;
mod deployment;
mod loader;
mod validation;

pub use app_config::*;
pub use deployment::*;
pub use loader::*;
pub use validation::*;
