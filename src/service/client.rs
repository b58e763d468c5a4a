//! Service client — sends protocol requests over TCP.
//!
//! Used by:
//! 1. The device agent (`gatewarden-agent`) for access requests
//! 2. The CLI subcommands (status, revoke, history)
//! 3. Integration tests exercising the full server flow
//!
//! Synchronous on purpose: each call opens a fresh connection, writes one
//! JSON line, and reads one back. Simple and reliable.

use crate::service::protocol::{AccessOutcome, ServiceRequest, ServiceResponse};
use anyhow::{bail, Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

pub struct ServiceClient {
    addr: String,
    timeout: Duration,
}

impl ServiceClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Send one request and read its response.
    pub fn send(&self, request: &ServiceRequest) -> Result<ServiceResponse> {
        let stream = TcpStream::connect(&self.addr).with_context(|| {
            format!(
                "Failed to connect to gatewarden at {}. Is the daemon running?",
                self.addr
            )
        })?;
        // The access operation can legitimately take a full reasoning
        // round trip, so the read timeout is generous.
        stream.set_read_timeout(Some(self.timeout))?;

        let mut writer = stream.try_clone()?;
        let json = serde_json::to_string(request)?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        reader.read_line(&mut response_line)?;

        let response: ServiceResponse = serde_json::from_str(response_line.trim())
            .context("Failed to parse service response")?;
        Ok(response)
    }

    /// Convenience: submit an access request for a URL.
    pub fn request_access(&self, url: &str, reason: &str) -> Result<AccessOutcome> {
        let response = self.send(&ServiceRequest::RequestAccess {
            url: url.to_string(),
            reason: reason.to_string(),
            device_ip: None,
        })?;
        match response {
            ServiceResponse::Access(outcome) => Ok(outcome),
            ServiceResponse::Error { message } => bail!("Service error: {}", message),
            other => bail!("Unexpected response: {:?}", other),
        }
    }

    pub fn status(&self) -> Result<ServiceResponse> {
        self.send(&ServiceRequest::Status)
    }

    pub fn revoke(&self, domain: &str) -> Result<ServiceResponse> {
        self.send(&ServiceRequest::Revoke {
            domain: domain.to_string(),
        })
    }

    pub fn revoke_all(&self) -> Result<ServiceResponse> {
        self.send(&ServiceRequest::RevokeAll)
    }

    pub fn history(&self) -> Result<ServiceResponse> {
        self.send(&ServiceRequest::History)
    }

    pub fn force_block(&self, device_ip: &str) -> Result<ServiceResponse> {
        self.send(&ServiceRequest::ForceBlock {
            device_ip: device_ip.to_string(),
        })
    }

    pub fn force_unblock(&self, device_ip: &str) -> Result<ServiceResponse> {
        self.send(&ServiceRequest::ForceUnblock {
            device_ip: device_ip.to_string(),
        })
    }
}
