//! Terminal TCP dispatcher: pipes a connection to one backend server.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::handler::{HandlerError, TcpConnection, TcpHandler};

pub struct TcpForwarder {
    address: String,
    connect_timeout: Duration,
}

impl TcpForwarder {
    /// `address` is `host:port`; the host is resolved at connect time.
    pub fn new(address: &str, connect_timeout: Duration) -> Result<Self, String> {
        let valid = address
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(format!("invalid server address {address:?}, expected host:port"));
        }
        Ok(Self {
            address: address.to_string(),
            connect_timeout,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl TcpHandler for TcpForwarder {
    async fn handle(&self, mut conn: TcpConnection) -> Result<(), HandlerError> {
        let mut upstream =
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::warn!(connection_id = %conn.id, server = %self.address, error = %e, "Upstream connect failed");
                    return Err(HandlerError::Upstream(e.to_string()));
                }
                Err(_) => {
                    tracing::warn!(connection_id = %conn.id, server = %self.address, "Upstream connect timed out");
                    return Err(HandlerError::UpstreamTimeout);
                }
            };
        let _ = upstream.set_nodelay(true);

        let (sent, received) = tokio::io::copy_bidirectional(&mut conn.stream, &mut upstream).await?;
        tracing::debug!(
            connection_id = %conn.id,
            server = %self.address,
            bytes_sent = sent,
            bytes_received = received,
            "Connection finished"
        );
        Ok(())
    }
}
