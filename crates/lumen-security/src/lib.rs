//! # Lumen Security
//!
//! JWT verification shared by the realtime gateway and the job API. Tokens
//! are issued by the HTTP ingress; the subject claim carries the owner id.

pub mod jwt;

pub use jwt::*;
