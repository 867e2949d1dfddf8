//! Length-prefixed message framing on the daemon socket.
//!
//! Responses are `[opcode: u8][length: u32 BE][payload]`. Requests carry one
//! extra preamble byte selecting the payload codec:
//! `[opcode: u8][format: u8][length: u32 BE][payload]`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame payload. A header announcing more than this
/// is treated as a protocol violation rather than an allocation request.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Server-to-client frame opcodes. Status opcodes carry a zero-length
/// payload; the length field is still present on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseOp {
    QueryItem = 0,
    QueryAsyncItem = 1,
    ActivationFinished = 2,
    ProviderState = 3,
    StatusDone = 253,
    QueryNoResults = 254,
    QueryDone = 255,
}

impl ResponseOp {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::QueryItem),
            1 => Some(Self::QueryAsyncItem),
            2 => Some(Self::ActivationFinished),
            3 => Some(Self::ProviderState),
            253 => Some(Self::StatusDone),
            254 => Some(Self::QueryNoResults),
            255 => Some(Self::QueryDone),
            _ => None,
        }
    }

    pub fn is_status(self) -> bool {
        matches!(
            self,
            Self::ActivationFinished | Self::StatusDone | Self::QueryNoResults | Self::QueryDone
        )
    }
}

/// Client-to-server request opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestOp {
    Query = 0,
    Activate = 1,
    State = 2,
    Menu = 3,
}

impl RequestOp {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Query),
            1 => Some(Self::Activate),
            2 => Some(Self::State),
            3 => Some(Self::Menu),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The peer closed the connection between frames.
    #[error("connection closed")]
    Closed,
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("frame length {0} exceeds limit")]
    Oversized(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One parsed request frame. The opcode and format bytes are kept raw so the
/// connection loop can report unknown values without losing stream sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestFrame {
    pub op: u8,
    pub format: u8,
    pub payload: Vec<u8>,
}

/// Write one response frame. The buffer is assembled up front so the frame
/// hits the stream in a single write.
pub async fn write_frame<W>(w: &mut W, op: ResponseOp, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(5 + payload.len());
    buf.push(op as u8);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    w.write_all(&buf).await?;
    w.flush().await?;
    Ok(())
}

/// Write one request frame (client side).
pub async fn write_request<W>(
    w: &mut W,
    op: RequestOp,
    format: u8,
    payload: &[u8],
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(6 + payload.len());
    buf.push(op as u8);
    buf.push(format);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    w.write_all(&buf).await?;
    w.flush().await?;
    Ok(())
}

/// Read exactly one response frame (client side). Unknown opcodes are a
/// protocol error; short reads surface as transport errors.
pub async fn read_frame<R>(r: &mut R) -> Result<(ResponseOp, Vec<u8>), FrameError>
where
    R: AsyncRead + Unpin,
{
    let first = read_first_byte(r).await?;
    let op = ResponseOp::from_byte(first).ok_or(FrameError::UnknownOpcode(first))?;
    let payload = read_length_prefixed(r).await?;
    Ok((op, payload))
}

/// Read exactly one request frame (server side). Header and payload are
/// consumed atomically; callers never see a partial frame.
pub async fn read_request<R>(r: &mut R) -> Result<RequestFrame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let op = read_first_byte(r).await?;
    let format = r.read_u8().await?;
    let payload = read_length_prefixed(r).await?;
    Ok(RequestFrame { op, format, payload })
}

/// EOF on the very first header byte is a clean close, not a short read.
async fn read_first_byte<R>(r: &mut R) -> Result<u8, FrameError>
where
    R: AsyncRead + Unpin,
{
    match r.read_u8().await {
        Ok(b) => Ok(b),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::Closed),
        Err(e) => Err(e.into()),
    }
}

async fn read_length_prefixed<R>(r: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let len = r.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Oversized(len));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip_is_byte_exact() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let payload = b"\x00\x01binary-ish payload\xff".to_vec();
        write_frame(&mut server, ResponseOp::QueryItem, &payload)
            .await
            .unwrap();

        let (op, got) = read_frame(&mut client).await.unwrap();
        assert_eq!(op, ResponseOp::QueryItem);
        assert_eq!(got, payload);
    }

    #[tokio::test]
    async fn status_frame_has_zero_length_payload() {
        let (mut client, mut server) = tokio::io::duplex(64);
        write_frame(&mut server, ResponseOp::QueryDone, &[]).await.unwrap();

        let (op, payload) = read_frame(&mut client).await.unwrap();
        assert_eq!(op, ResponseOp::QueryDone);
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn request_roundtrip_preserves_format_byte() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_request(&mut client, RequestOp::Query, 1, b"{\"query\":\"x\"}")
            .await
            .unwrap();

        let frame = read_request(&mut server).await.unwrap();
        assert_eq!(frame.op, RequestOp::Query as u8);
        assert_eq!(frame.format, 1);
        assert_eq!(frame.payload, b"{\"query\":\"x\"}");
    }

    #[tokio::test]
    async fn unknown_response_opcode_is_protocol_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        server.write_all(&[42, 0, 0, 0, 0]).await.unwrap();

        match read_frame(&mut client).await {
            Err(FrameError::UnknownOpcode(42)) => {}
            other => panic!("expected unknown opcode, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn eof_between_frames_is_clean_close() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);

        match read_frame(&mut client).await {
            Err(FrameError::Closed) => {}
            other => panic!("expected clean close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_payload_is_transport_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        // announce 10 bytes, deliver 3, close
        server.write_all(&[0, 0, 0, 0, 10, 1, 2, 3]).await.unwrap();
        drop(server);

        match read_frame(&mut client).await {
            Err(FrameError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof);
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_header_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        use tokio::io::AsyncWriteExt;
        let len = (MAX_FRAME_LEN + 1).to_be_bytes();
        server
            .write_all(&[0, len[0], len[1], len[2], len[3]])
            .await
            .unwrap();

        assert!(matches!(
            read_frame(&mut client).await,
            Err(FrameError::Oversized(_))
        ));
    }

    #[test]
    fn opcode_bytes_are_stable() {
        assert_eq!(ResponseOp::QueryItem as u8, 0);
        assert_eq!(ResponseOp::QueryAsyncItem as u8, 1);
        assert_eq!(ResponseOp::ActivationFinished as u8, 2);
        assert_eq!(ResponseOp::ProviderState as u8, 3);
        assert_eq!(ResponseOp::StatusDone as u8, 253);
        assert_eq!(ResponseOp::QueryNoResults as u8, 254);
        assert_eq!(ResponseOp::QueryDone as u8, 255);
        assert_eq!(RequestOp::Query as u8, 0);
        assert_eq!(RequestOp::Activate as u8, 1);
        assert_eq!(RequestOp::State as u8, 2);
        assert_eq!(RequestOp::Menu as u8, 3);
    }

    #[test]
    fn status_classification() {
        assert!(ResponseOp::QueryDone.is_status());
        assert!(ResponseOp::StatusDone.is_status());
        assert!(ResponseOp::ActivationFinished.is_status());
        assert!(!ResponseOp::QueryItem.is_status());
        assert!(!ResponseOp::ProviderState.is_status());
    }
}
