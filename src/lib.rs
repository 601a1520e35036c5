//! Keeps code annotations ("markers") attached to the right lines while the
//! file they point at changes, plus the keyed entity cache that backs the
//! store of recorded locations.

pub mod cache;
pub mod config;
pub mod error;
pub mod git;
pub mod location;
pub mod logging;
