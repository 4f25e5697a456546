//! Command sinks
//!
//! Delivery is fire-and-forget: a send never waits for the endpoint and a
//! failure is reported to the caller, who logs it and moves on.

use crate::error::SinkError;
use overtake_model::Command;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

/// Destination for actuation commands
pub trait CommandSink: Send {
    /// Hand off one command without blocking
    fn send(&self, command: &Command) -> Result<(), SinkError>;
}

/// Sends each command as one JSON datagram
pub struct UdpCommandSink {
    socket: UdpSocket,
    endpoint: SocketAddr,
}

impl UdpCommandSink {
    /// Bind an ephemeral local socket aimed at `endpoint` ("host:port")
    pub async fn bind(endpoint: &str) -> Result<Self, SinkError> {
        let endpoint: SocketAddr = endpoint
            .parse()
            .map_err(|_| SinkError::InvalidEndpoint(endpoint.to_string()))?;
        let local = if endpoint.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        info!("Command sink bound to {}, sending to {}", socket.local_addr()?, endpoint);
        Ok(Self { socket, endpoint })
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }
}

impl CommandSink for UdpCommandSink {
    fn send(&self, command: &Command) -> Result<(), SinkError> {
        let payload = command.encode()?;
        let sent = self.socket.try_send_to(&payload, self.endpoint)?;
        debug!("Sent {} bytes: {} {}", sent, command.kind, command.arg);
        Ok(())
    }
}

/// Forwards commands into an in-process channel
pub struct ChannelCommandSink {
    tx: mpsc::Sender<Command>,
}

impl ChannelCommandSink {
    /// Create a sink and the receiver that drains it
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl CommandSink for ChannelCommandSink {
    fn send(&self, command: &Command) -> Result<(), SinkError> {
        self.tx.try_send(command.clone()).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::ChannelFull,
            TrySendError::Closed(_) => SinkError::ChannelClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overtake_model::{CommandKind, CommandSequencer};

    #[tokio::test]
    async fn test_udp_sink_sends_json_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap().to_string();
        let sink = UdpCommandSink::bind(&addr).await.unwrap();

        let mut seq = CommandSequencer::new();
        let command = seq.next(CommandKind::Overtake, "LEFT", 1234);
        sink.send(&command).unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(value["index"], 1);
        assert_eq!(value["cmd"], "OVERTAKE");
        assert_eq!(value["arg"], "LEFT");
        assert_eq!(value["timestamp"], 1234);
    }

    #[tokio::test]
    async fn test_udp_sink_rejects_bad_endpoint() {
        let result = UdpCommandSink::bind("not-an-address").await;
        assert!(matches!(result, Err(SinkError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_channel_sink_full_and_closed() {
        let (sink, mut rx) = ChannelCommandSink::new(1);
        let mut seq = CommandSequencer::new();
        sink.send(&seq.next(CommandKind::Speed, "90", 0)).unwrap();
        assert!(matches!(
            sink.send(&seq.next(CommandKind::Speed, "95", 0)),
            Err(SinkError::ChannelFull)
        ));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.arg, "90");

        drop(rx);
        assert!(matches!(
            sink.send(&seq.next(CommandKind::Speed, "100", 0)),
            Err(SinkError::ChannelClosed)
        ));
    }
}
