//! Command implementations

pub mod check;
pub mod completions;
pub mod eval;
pub mod tol;
pub mod validate;
