//! # Job Domain
//!
//! The thumbnail job record, its status state machine, the media kind
//! discriminator, and the transient status events fanned out to realtime
//! sessions.

pub mod event;
pub mod job;
pub mod media;
pub mod status;

pub use event::*;
pub use job::*;
pub use media::*;
pub use status::*;
