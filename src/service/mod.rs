//! Grant Service — the request-facing orchestrator and its wire surface.
//!
//! A JSON-line protocol over TCP: clients (device agents, the CLI, Home
//! Assistant automations) send one request object per line and read one
//! response object back. The service validates the request, gathers
//! context, consults the gatekeeper, and drives the registry on approval.

mod client;
mod protocol;
mod server;
#[allow(clippy::module_inception)]
mod service;

pub use client::ServiceClient;
pub use protocol::{AccessOutcome, GrantStatus, ServiceRequest, ServiceResponse};
pub use server::ServiceServer;
pub use service::GrantService;
