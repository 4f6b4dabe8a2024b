//! Core domain entities.
//!
//! - [`Link`] - A shortened URL mapping owned by the persistence layer
//! - [`NewLink`] - Input for creating a link

pub mod link;

pub use link::{Link, NewLink};
