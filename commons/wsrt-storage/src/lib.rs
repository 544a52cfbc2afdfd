//! Durable cache of runtime states and the machines and servers that belong
//! to them. Backends are selected with cargo features.

pub mod error;
pub mod traits;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redb")]
pub mod redb;

pub mod unified;

pub use error::*;
pub use traits::*;
