//! Sync service wire format.
//!
//! Every message starts with a 4-byte ASCII command tag. Requests are always
//! `tag | len:u32 | payload`. Responses use a body layout chosen by the tag:
//! STAT and DENT carry fixed structures, DONE carries one 4-byte word, and
//! everything else is length-prefixed like a request.
//!
//! Wire format: all multi-byte integers are little-endian.

use crate::error::{AdbError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest DATA payload adbd accepts in one frame (SYNC_DATA_MAX)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Default ceiling for inbound length-prefixed frames (16MB) - prevents OOM
/// from corrupted length words
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Longest remote path adbd will accept
pub const MAX_PATH_LENGTH: usize = 1024;

/// Tag + length word
pub const HEADER_SIZE: usize = 8;

/// mode + size + mtime
pub const STAT_BODY_SIZE: usize = 12;

/// mode + size + mtime + namelen
pub const DENT_HEAD_SIZE: usize = 16;

// =============================================================================
// Command tags
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncCommand {
    Stat,
    List,
    Dent,
    Send,
    Recv,
    Data,
    Done,
    Okay,
    Fail,
}

/// How the bytes following a response tag are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLayout {
    /// Exactly this many bytes, no length word
    Fixed(usize),
    /// 16-byte head whose last word is the length of a trailing name
    Dent,
    /// u32 length word followed by that many bytes
    LengthPrefixed,
}

impl SyncCommand {
    pub const ALL: [SyncCommand; 9] = [
        Self::Stat,
        Self::List,
        Self::Dent,
        Self::Send,
        Self::Recv,
        Self::Data,
        Self::Done,
        Self::Okay,
        Self::Fail,
    ];

    pub const fn code(self) -> &'static [u8; 4] {
        match self {
            Self::Stat => b"STAT",
            Self::List => b"LIST",
            Self::Dent => b"DENT",
            Self::Send => b"SEND",
            Self::Recv => b"RECV",
            Self::Data => b"DATA",
            Self::Done => b"DONE",
            Self::Okay => b"OKAY",
            Self::Fail => b"FAIL",
        }
    }

    pub fn from_code(code: &[u8]) -> Option<Self> {
        match code {
            b"STAT" => Some(Self::Stat),
            b"LIST" => Some(Self::List),
            b"DENT" => Some(Self::Dent),
            b"SEND" => Some(Self::Send),
            b"RECV" => Some(Self::Recv),
            b"DATA" => Some(Self::Data),
            b"DONE" => Some(Self::Done),
            b"OKAY" => Some(Self::Okay),
            b"FAIL" => Some(Self::Fail),
            _ => None,
        }
    }

    /// Layout of this tag's body when it arrives from the device.
    pub const fn response_layout(self) -> BodyLayout {
        match self {
            Self::Stat => BodyLayout::Fixed(STAT_BODY_SIZE),
            Self::Dent => BodyLayout::Dent,
            Self::Done => BodyLayout::Fixed(4),
            Self::List
            | Self::Send
            | Self::Recv
            | Self::Data
            | Self::Okay
            | Self::Fail => BodyLayout::LengthPrefixed,
        }
    }
}

impl fmt::Display for SyncCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tags are ASCII by construction
        f.write_str(std::str::from_utf8(self.code()).unwrap_or("????"))
    }
}

// =============================================================================
// Frames
// =============================================================================

/// One decoded response: its tag and the body bytes following it (without the
/// length word for length-prefixed tags).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: SyncCommand,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(command: SyncCommand, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// The payload as text, used for FAIL messages.
    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Encode in the device-to-client layout for this tag.
    pub fn encode(&self) -> Bytes {
        match self.command.response_layout() {
            BodyLayout::Fixed(_) | BodyLayout::Dent => {
                let mut buf = BytesMut::with_capacity(4 + self.payload.len());
                buf.put_slice(self.command.code());
                buf.put_slice(&self.payload);
                buf.freeze()
            }
            BodyLayout::LengthPrefixed => encode_request(self.command, &self.payload),
        }
    }
}

/// Encode a client request: `tag | len | payload`.
pub fn encode_request(command: SyncCommand, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_slice(command.code());
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encode a bare header whose length word carries a value instead of a
/// length. Used for the DONE that closes a push, where the word is the mtime.
pub fn encode_header(command: SyncCommand, word: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE);
    buf.put_slice(command.code());
    buf.put_u32_le(word);
    buf.freeze()
}

// =============================================================================
// Frame reading/writing
// =============================================================================

async fn read_bytes<R: AsyncRead + Unpin>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

fn check_len(len: u32, max_frame_size: u32) -> Result<()> {
    if len > max_frame_size {
        return Err(AdbError::FrameTooLarge {
            len,
            max: max_frame_size,
        });
    }
    Ok(())
}

/// Read a single response frame from the stream.
///
/// A stream that ends before the frame is complete is an I/O error. The tag is
/// only checked for membership in the command set; whether it is acceptable
/// in the current exchange is up to the caller.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R, max_frame_size: u32) -> Result<Frame> {
    let mut code = [0u8; 4];
    r.read_exact(&mut code).await?;
    let command = SyncCommand::from_code(&code).ok_or_else(|| AdbError::UnexpectedResponse {
        got: format!("tag {:?}", String::from_utf8_lossy(&code)),
        during: "reading a frame header",
    })?;

    let payload = match command.response_layout() {
        BodyLayout::Fixed(n) => read_bytes(r, n).await?,
        BodyLayout::Dent => {
            let mut body = read_bytes(r, DENT_HEAD_SIZE).await?;
            let name_len = u32::from_le_bytes([body[12], body[13], body[14], body[15]]);
            check_len(name_len, max_frame_size)?;
            let name = read_bytes(r, name_len as usize).await?;
            body.extend_from_slice(&name);
            body
        }
        BodyLayout::LengthPrefixed => {
            let len = r.read_u32_le().await?;
            check_len(len, max_frame_size)?;
            read_bytes(r, len as usize).await?
        }
    };

    tracing::trace!(command = %command, len = payload.len(), "read sync frame");
    Ok(Frame::new(command, payload))
}

/// Write a pre-encoded frame to the stream.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, frame: &Bytes) -> Result<()> {
    w.write_all(frame).await?;
    Ok(())
}

/// Encode and write a request, flushing so the device sees it immediately.
pub async fn write_request<W: AsyncWrite + Unpin>(
    w: &mut W,
    command: SyncCommand,
    payload: &[u8],
) -> Result<()> {
    tracing::trace!(command = %command, len = payload.len(), "write sync request");
    write_frame(w, &encode_request(command, payload)).await?;
    w.flush().await?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes() {
        for command in SyncCommand::ALL {
            assert_eq!(SyncCommand::from_code(command.code()), Some(command));
        }
        assert_eq!(SyncCommand::from_code(b"QUIT"), None);
        assert_eq!(SyncCommand::from_code(b"STA"), None);
        assert_eq!(SyncCommand::Recv.to_string(), "RECV");
    }

    #[test]
    fn test_encode_request() {
        let encoded = encode_request(SyncCommand::Stat, b"/fstab.donatello");
        assert_eq!(&encoded[..4], b"STAT");
        assert_eq!(&encoded[4..8], &16u32.to_le_bytes());
        assert_eq!(&encoded[8..], b"/fstab.donatello");
    }

    #[test]
    fn test_encode_header_carries_word() {
        let encoded = encode_header(SyncCommand::Done, 1446505200);
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(&encoded[..4], b"DONE");
        assert_eq!(&encoded[4..], &1446505200u32.to_le_bytes());
    }

    #[tokio::test]
    async fn test_read_stat_fixed_body() {
        let wire = Frame::new(
            SyncCommand::Stat,
            vec![160, 129, 0, 0, 85, 2, 0, 0, 0, 0, 0, 0],
        )
        .encode();
        assert_eq!(wire.len(), 16);

        let frame = read_frame(&mut &wire[..], MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(frame.command, SyncCommand::Stat);
        assert_eq!(frame.payload.len(), STAT_BODY_SIZE);
    }

    #[tokio::test]
    async fn test_read_dent_with_name() {
        let mut body = vec![233, 65, 0, 0, 0, 0, 0, 0, 152, 130, 56, 86];
        body.extend_from_slice(&7u32.to_le_bytes());
        body.extend_from_slice(b"sdcard0");
        let mut wire = Frame::new(SyncCommand::Dent, body.clone()).encode().to_vec();
        // Trailing bytes belong to the next frame
        wire.extend_from_slice(b"DONE\0\0\0\0");

        let mut reader = &wire[..];
        let frame = read_frame(&mut reader, MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(frame.command, SyncCommand::Dent);
        assert_eq!(frame.payload.as_ref(), &body[..]);

        let done = read_frame(&mut reader, MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(done.command, SyncCommand::Done);
        assert_eq!(done.payload.len(), 4);
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_read_fail_message() {
        let wire = Frame::new(SyncCommand::Fail, "No such file or directory").encode();
        let frame = read_frame(&mut &wire[..], MAX_FRAME_SIZE).await.unwrap();
        assert_eq!(frame.command, SyncCommand::Fail);
        assert_eq!(frame.message(), "No such file or directory");
    }

    #[tokio::test]
    async fn test_truncated_payload_is_io_error() {
        let wire = Frame::new(SyncCommand::Data, vec![7u8; 32]).encode();
        let err = read_frame(&mut &wire[..20], MAX_FRAME_SIZE)
            .await
            .unwrap_err();
        match err {
            AdbError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_tag_rejected() {
        let wire = b"WHAT\0\0\0\0";
        let err = read_frame(&mut &wire[..], MAX_FRAME_SIZE).await.unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_before_allocation() {
        let wire = encode_header(SyncCommand::Data, u32::MAX);
        let err = read_frame(&mut &wire[..], MAX_FRAME_SIZE).await.unwrap_err();
        assert!(matches!(err, AdbError::FrameTooLarge { len: u32::MAX, .. }));
    }

    #[tokio::test]
    async fn test_write_request() {
        let mut out = Vec::new();
        write_request(&mut out, SyncCommand::List, b"/storage")
            .await
            .unwrap();
        assert_eq!(out, encode_request(SyncCommand::List, b"/storage").to_vec());
    }
}
