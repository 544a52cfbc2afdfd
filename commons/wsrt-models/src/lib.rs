pub mod attrs;
pub mod environment;
pub mod identity;
pub mod runtime;

pub use environment::*;
pub use identity::*;
pub use runtime::*;
