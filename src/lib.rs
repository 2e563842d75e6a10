//! qcheck: measurement tolerance evaluation
//!
//! Classifies operator-entered QA measurements against references and
//! tolerance bands, tracks per-measurement skip/visibility state and keeps
//! derived (composite) measurements up to date.

pub mod cli;
pub mod core;
pub mod entities;
pub mod yaml;
