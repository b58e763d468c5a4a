//! JSON-line TCP server for the service protocol.
//!
//! One task per connection; each line is parsed, dispatched to the
//! GrantService, and answered with one response line. A malformed line
//! gets an error response instead of dropping the connection.

use crate::service::{GrantService, ServiceRequest, ServiceResponse};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

pub struct ServiceServer {
    addr: String,
    service: Arc<GrantService>,
}

impl ServiceServer {
    pub fn new(addr: impl Into<String>, service: Arc<GrantService>) -> Self {
        Self {
            addr: addr.into(),
            service,
        }
    }

    /// Accept connections forever.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.addr))?;
        tracing::info!("Service listening on {}", self.addr);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let service = self.service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer.ip().to_string(), service).await
                        {
                            tracing::error!("Connection handler error: {:#}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_ip: String,
    service: Arc<GrantService>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // Connection closed
        }

        let response = match serde_json::from_str::<ServiceRequest>(line.trim()) {
            Ok(request) => service.handle(request, &peer_ip).await,
            Err(e) => ServiceResponse::Error {
                message: format!("Invalid request JSON: {}", e),
            },
        };

        let json = serde_json::to_string(&response)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}
