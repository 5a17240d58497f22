//! Two-player sessions over TCP.
//!
//! One side hosts and accepts exactly one peer; the other joins by address.
//! Both then exchange newline-delimited JSON [`PeerMessage`]s. The host plays
//! White. Moves travel as coordinate strings; the receiving side validates
//! them against its own `Game` like any other input.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::engine::types::Color;

/// Messages exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// First message from each side; `color` is the sender's.
    Hello { name: String, color: Color },
    Move { uci: String },
    Resign,
    DrawOffer,
    DrawAccept,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection")]
    Closed,

    #[error("malformed message '{line}': {source}")]
    Malformed {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("handshake failed: {0}")]
    Handshake(String),
}

// ---------------------------------------------------------------------------
// Hosting
// ---------------------------------------------------------------------------

/// A bound socket waiting for its one peer.
pub struct PeerListener {
    listener: TcpListener,
}

impl PeerListener {
    pub async fn bind(addr: &str) -> Result<Self, SessionError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "waiting for a peer");
        Ok(PeerListener { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SessionError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the first peer and greet it. The listener is consumed, so no
    /// second peer can connect.
    pub async fn accept(self, name: &str) -> Result<PeerSession, SessionError> {
        let (stream, addr) = self.listener.accept().await?;
        info!(%addr, "peer connected");
        let mut session = PeerSession::new(stream, Color::White, addr);
        session
            .send(&PeerMessage::Hello {
                name: name.to_string(),
                color: Color::White,
            })
            .await?;
        session.peer_name = session.expect_hello(Color::Black).await?;
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An established connection to the other player.
pub struct PeerSession {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    local_color: Color,
    peer_name: String,
    peer_addr: SocketAddr,
}

impl PeerSession {
    fn new(stream: TcpStream, local_color: Color, peer_addr: SocketAddr) -> Self {
        let (reader, writer) = stream.into_split();
        PeerSession {
            lines: BufReader::new(reader).lines(),
            writer,
            local_color,
            peer_name: String::new(),
            peer_addr,
        }
    }

    /// Connect to a host and complete the greeting. The joiner plays Black.
    pub async fn join(addr: &str, name: &str) -> Result<Self, SessionError> {
        let stream = TcpStream::connect(addr).await?;
        let peer_addr = stream.peer_addr()?;
        info!(%peer_addr, "connected to host");
        let mut session = PeerSession::new(stream, Color::Black, peer_addr);
        session.peer_name = session.expect_hello(Color::White).await?;
        session
            .send(&PeerMessage::Hello {
                name: name.to_string(),
                color: Color::Black,
            })
            .await?;
        Ok(session)
    }

    pub fn local_color(&self) -> Color {
        self.local_color
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub async fn send(&mut self, msg: &PeerMessage) -> Result<(), SessionError> {
        let mut line = serde_json::to_vec(msg).map_err(std::io::Error::from)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        debug!(?msg, "sent to peer");
        Ok(())
    }

    /// Next message from the peer. Blank lines are skipped.
    pub async fn recv(&mut self) -> Result<PeerMessage, SessionError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Err(SessionError::Closed);
            };
            if line.trim().is_empty() {
                continue;
            }
            let msg = serde_json::from_str(&line)
                .map_err(|source| SessionError::Malformed { line, source })?;
            debug!(?msg, "received from peer");
            return Ok(msg);
        }
    }

    async fn expect_hello(&mut self, color: Color) -> Result<String, SessionError> {
        match self.recv().await? {
            PeerMessage::Hello { name, color: c } if c == color => Ok(name),
            PeerMessage::Hello { color: c, .. } => Err(SessionError::Handshake(format!(
                "peer wants to play {c}, expected {color}"
            ))),
            other => Err(SessionError::Handshake(format!(
                "expected hello, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format() {
        let hello = PeerMessage::Hello {
            name: "Ana".into(),
            color: Color::White,
        };
        assert_eq!(
            serde_json::to_string(&hello).unwrap(),
            r#"{"type":"hello","name":"Ana","color":"white"}"#
        );
        assert_eq!(
            serde_json::to_string(&PeerMessage::DrawOffer).unwrap(),
            r#"{"type":"draw_offer"}"#
        );
        let mv: PeerMessage = serde_json::from_str(r#"{"type":"move","uci":"e2e4"}"#).unwrap();
        assert_eq!(mv, PeerMessage::Move { uci: "e2e4".into() });
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<PeerMessage>(r#"{"type":"teleport"}"#).is_err());
    }
}
