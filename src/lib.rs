//! Gatewarden — LLM-gated domain blocklist library.
//!
//! This library exposes the core components of gatewarden for integration
//! testing and for the two binaries: the daemon/CLI in `main.rs` and the
//! device agent in `agent/main.rs`.

// Many items are pub for use by the agent binary and integration tests,
// which are separate compilation units — suppress false dead_code warnings.
#![allow(dead_code)]

pub mod blocklist;
pub mod client;
pub mod config;
pub mod context;
pub mod gatekeeper;
pub mod history;
pub mod registry;
pub mod scope;
pub mod service;
