//! Custom extractors.

mod owner;

pub use owner::AuthenticatedOwner;
