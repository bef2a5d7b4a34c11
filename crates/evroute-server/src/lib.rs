//! Shared library surface for the evroute server and its tests.

pub mod api;
pub mod config;
pub mod state;
