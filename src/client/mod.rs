//! Client Scope Cache — the per-device half of enforcement.
//!
//! DNS-level unblocking is domain-wide; only the device itself can narrow
//! a grant to a path prefix. Each device agent keeps its own best-effort
//! copy of the grants it was told about, independently timed, never
//! refreshed from the server. The cache can only ever be more restrictive
//! than server truth: a lapsed local scope just re-triggers the request
//! flow, it never grants access the server already withdrew.

mod cache;

pub use cache::{ClientScope, ScopeCache};
