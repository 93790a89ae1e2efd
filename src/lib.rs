//! Client-side bale scoring for archery ranking rounds: local score capture,
//! roster reconciliation across data sources, and opportunistic sync against
//! a remote scoring server.

pub mod api;
pub mod config;
pub mod error;
pub mod roster;
pub mod scoring;
pub mod session;
pub mod state;
pub mod sync;
