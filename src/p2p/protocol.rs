//! P2P protocol messages
//!
//! Defines the message types for network communication and their framing:
//! 4-byte network magic, 4-byte little-endian payload length, bincode payload.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Peer;
use crate::consensus::{Block, GenesisBlock};
use crate::validation::SignedTransaction;

/// Network magic bytes
pub const NETWORK_MAGIC: [u8; 4] = *b"SLOT";

/// Maximum message size (4 MB)
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Frame header length: magic plus length
const HEADER_LEN: usize = 8;

/// Wire errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid network magic")]
    InvalidMagic,
    #[error("Message of {0} bytes exceeds the size limit")]
    TooLarge(usize),
    #[error("Incomplete message")]
    Truncated,
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// P2P message types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Announce a peer that joined the overlay
    NewPeer(Peer),
    /// Ask for the peer list and genesis block
    RequestInitInfo,
    /// Reply to `RequestInitInfo`
    InitInfo { peers: Vec<Peer>, genesis: GenesisBlock },
    /// Transaction data
    Transaction(SignedTransaction),
    /// Block data
    Block(Block),
}

impl Message {
    /// Serialize message to a framed byte string
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload = bincode::serialize(self)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge(payload.len()));
        }

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&NETWORK_MAGIC);
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Deserialize message from a framed byte string
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated);
        }
        let length = parse_header(&bytes[..HEADER_LEN])?;
        if bytes.len() < HEADER_LEN + length {
            return Err(ProtocolError::Truncated);
        }

        Ok(bincode::deserialize(&bytes[HEADER_LEN..HEADER_LEN + length])?)
    }

    /// Get the command name for this message
    pub fn command(&self) -> &'static str {
        match self {
            Message::NewPeer(_) => "newpeer",
            Message::RequestInitInfo => "requestinitinfo",
            Message::InitInfo { .. } => "initinfo",
            Message::Transaction(_) => "transaction",
            Message::Block(_) => "block",
        }
    }
}

/// Check magic and return the payload length
fn parse_header(header: &[u8]) -> Result<usize, ProtocolError> {
    if header[0..4] != NETWORK_MAGIC {
        return Err(ProtocolError::InvalidMagic);
    }
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(length));
    }
    Ok(length)
}

/// Read one framed message
///
/// Returns `Ok(None)` when the peer closes the stream between frames.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let length = parse_header(&header)?;
    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(bincode::deserialize(&payload)?))
}

/// Write one framed message
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = message.to_bytes()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn sample_transaction() -> SignedTransaction {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        SignedTransaction::new("127.0.0.1:9000-0", &alice, bob.public_key.clone(), 42)
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::Transaction(sample_transaction());
        let bytes = msg.to_bytes().unwrap();
        let recovered = Message::from_bytes(&bytes).unwrap();

        assert_eq!(recovered, msg);
    }

    #[test]
    fn test_network_magic() {
        let bytes = Message::RequestInitInfo.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &NETWORK_MAGIC);
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let mut bytes = Message::RequestInitInfo.to_bytes().unwrap();
        bytes[0] = 0xFF;

        assert!(matches!(Message::from_bytes(&bytes), Err(ProtocolError::InvalidMagic)));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut bytes = Message::RequestInitInfo.to_bytes().unwrap();
        bytes[4..8].copy_from_slice(&(MAX_MESSAGE_SIZE as u32 + 1).to_le_bytes());

        assert!(matches!(Message::from_bytes(&bytes), Err(ProtocolError::TooLarge(_))));
    }

    #[test]
    fn test_garbage_payload_rejected() {
        let mut bytes = NETWORK_MAGIC.to_vec();
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[0xFF, 0xFF, 0xFF]);

        assert!(Message::from_bytes(&bytes).is_err());
    }

    #[tokio::test]
    async fn test_stream_framing() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let first = Message::Transaction(sample_transaction());
        let second = Message::RequestInitInfo;

        write_message(&mut client, &first).await.unwrap();
        write_message(&mut client, &second).await.unwrap();
        drop(client);

        assert_eq!(read_message(&mut server).await.unwrap(), Some(first));
        assert_eq!(read_message(&mut server).await.unwrap(), Some(second));
        assert_eq!(read_message(&mut server).await.unwrap(), None);
    }
}
