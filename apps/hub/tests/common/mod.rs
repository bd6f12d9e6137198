//! Common test utilities for hub integration tests
//!
//! Spins up the real router on an ephemeral port and talks to it with a
//! websocket client.

#![allow(dead_code, unused_imports)]

pub mod helpers;

pub use helpers::*;
