//! Internal utilities shared by the `ecs` crate.
//!
//! Not intended to be used directly by applications.

mod ti_vec;

pub use ti_vec::*;
