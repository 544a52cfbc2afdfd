//! Runs one operation against many targets.
//!
//! Two modes are offered: [`do_in_sequence`] tries targets one by one and
//! stops at the first acceptable result, [`do_in_parallel`] starts every
//! eligible target at once and collects whatever finished before a
//! collective deadline.

mod operation;
mod parallel;
mod sequence;

pub use operation::{Accepted, OperationError, TargetOperation};
pub use parallel::{ParallelReport, do_in_parallel};
pub use sequence::do_in_sequence;
