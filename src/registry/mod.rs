//! Grant Registry — the authoritative table of live access grants.
//!
//! The registry is the only writer of the Blocklist Store. Every mutation
//! (grant, revoke, expiry) runs under one lock, derives the blocked set
//! from scratch, and applies it before the caller sees success. Expiry is
//! a cancellable timer per grant, keyed by grant id, so a superseded
//! grant's late timer can never re-block a freshly re-granted domain.
//!
//! Grants are deliberately not durable. A restart re-blocks everything:
//! the hosts file is re-derived from configuration alone, and any state a
//! previous process left on disk is discarded. DNS-level unblocking is
//! domain-wide for every device on the network; per-device path narrowing
//! only exists on devices running the agent.

mod registry;
mod types;

pub use registry::GrantRegistry;
pub use types::{AccessGrant, GrantError};
