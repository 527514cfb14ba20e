//! CLI command implementations.

pub mod evaluate;
pub mod input;
pub mod replay;
