//! Core library for fwup.
//!
//! Two halves share this crate:
//!
//! - the **device side** ([`updater`], [`io`]): poll a branch's published
//!   manifest, download the referenced package with streaming SHA-256
//!   verification, extract it, persist the installed state and restart;
//! - the **build side** ([`packager`], [`revision`]): turn tracked revisions of
//!   each application into content-addressed package archives, publish the
//!   per-branch latest pointers, and render browsable index pages.

pub mod config;
pub mod io;
pub mod packager;
pub mod paths;
pub mod reporter;
pub mod revision;
pub mod updater;

pub use paths::*;
pub use reporter::{LogReporter, NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("fwup-core/", env!("CARGO_PKG_VERSION"));
