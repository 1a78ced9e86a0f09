//! Command implementations

pub mod check;
pub mod completions;
pub mod recover;
pub mod run;
pub mod status;
