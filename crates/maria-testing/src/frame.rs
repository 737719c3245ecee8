//! Wire format spoken between [`MockConnection`](crate::MockConnection) and
//! [`MockServer`](crate::MockServer).
//!
//! Every frame is a little-endian `u32` body length followed by the body: a
//! one-byte tag and a tag-specific payload. Strings are `u32`-length
//! prefixed. Column and parameter values carry a leading null flag.
//!
//! ```text
//! +----------------+-----+-----------------+
//! | length: u32 LE | tag | payload ...     |
//! +----------------+-----+-----------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the length prefix.
pub const HEADER_SIZE: usize = 4;

/// Largest accepted frame body.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

mod tags {
    pub const QUIT: u8 = 0x01;
    pub const QUERY: u8 = 0x03;
    pub const PREPARE: u8 = 0x16;
    pub const EXECUTE: u8 = 0x17;
    pub const STMT_CLOSE: u8 = 0x19;
    pub const HELLO: u8 = 0x80;

    pub const OK: u8 = 0x00;
    pub const RESULT_HEADER: u8 = 0x81;
    pub const ROW: u8 = 0x82;
    pub const PREPARE_OK: u8 = 0x83;
    pub const EOF: u8 = 0xFE;
    pub const ERR: u8 = 0xFF;
}

/// Errors decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The body ended before the payload was complete.
    #[error("frame payload truncated")]
    Truncated,

    /// Unknown frame tag.
    #[error("unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),

    /// Declared body length exceeds [`MAX_FRAME_SIZE`].
    #[error("frame of {0} bytes exceeds the maximum size")]
    Oversized(usize),

    /// Zero-length body.
    #[error("empty frame")]
    Empty,

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// Bytes left over after the payload.
    #[error("{0} trailing bytes after payload")]
    Trailing(usize),
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Connection handshake with credentials.
    Hello {
        /// User name.
        user: String,
        /// Password.
        password: String,
        /// Default database.
        database: Option<String>,
    },
    /// Text query.
    Query(String),
    /// Prepare a statement.
    Prepare(String),
    /// Execute a prepared statement.
    Execute {
        /// Server-assigned statement id.
        stmt_id: u32,
        /// Bound parameters, `None` for NULL.
        params: Vec<Option<Bytes>>,
    },
    /// Release a prepared statement. Not answered.
    StmtClose(u32),
    /// End the session. Not answered.
    Quit,
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Success without a result set.
    Ok {
        /// Affected row count.
        affected: u64,
    },
    /// Failure.
    Err {
        /// Error code.
        code: u32,
        /// Error text.
        message: String,
    },
    /// Start of a result set; rows follow, then [`ServerFrame::Eof`].
    ResultHeader {
        /// Column count.
        columns: u32,
    },
    /// One result row.
    Row(Vec<Option<Bytes>>),
    /// End of a result set.
    Eof,
    /// Statement prepared.
    PrepareOk {
        /// Server-assigned statement id.
        stmt_id: u32,
        /// Placeholder count.
        params: u32,
        /// Result column count.
        columns: u32,
    },
}

impl ClientFrame {
    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        let mark = begin(dst);
        match self {
            Self::Hello {
                user,
                password,
                database,
            } => {
                dst.put_u8(tags::HELLO);
                put_str(dst, user);
                put_str(dst, password);
                put_value(dst, database.as_deref().map(str::as_bytes));
            }
            Self::Query(sql) => {
                dst.put_u8(tags::QUERY);
                put_str(dst, sql);
            }
            Self::Prepare(sql) => {
                dst.put_u8(tags::PREPARE);
                put_str(dst, sql);
            }
            Self::Execute { stmt_id, params } => {
                dst.put_u8(tags::EXECUTE);
                dst.put_u32_le(*stmt_id);
                put_values(dst, params);
            }
            Self::StmtClose(stmt_id) => {
                dst.put_u8(tags::STMT_CLOSE);
                dst.put_u32_le(*stmt_id);
            }
            Self::Quit => dst.put_u8(tags::QUIT),
        }
        finish(dst, mark);
    }

    /// Decode one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched when the frame is not
    /// complete yet.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, FrameError> {
        let Some((tag, mut body)) = split_frame(src)? else {
            return Ok(None);
        };
        let frame = match tag {
            tags::HELLO => Self::Hello {
                user: get_str(&mut body)?,
                password: get_str(&mut body)?,
                database: get_value(&mut body)?
                    .map(|v| String::from_utf8(v.to_vec()).map_err(|_| FrameError::InvalidUtf8))
                    .transpose()?,
            },
            tags::QUERY => Self::Query(get_str(&mut body)?),
            tags::PREPARE => Self::Prepare(get_str(&mut body)?),
            tags::EXECUTE => Self::Execute {
                stmt_id: get_u32(&mut body)?,
                params: get_values(&mut body)?,
            },
            tags::STMT_CLOSE => Self::StmtClose(get_u32(&mut body)?),
            tags::QUIT => Self::Quit,
            other => return Err(FrameError::UnknownTag(other)),
        };
        expect_end(&body)?;
        Ok(Some(frame))
    }
}

impl ServerFrame {
    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        let mark = begin(dst);
        match self {
            Self::Ok { affected } => {
                dst.put_u8(tags::OK);
                dst.put_u64_le(*affected);
            }
            Self::Err { code, message } => {
                dst.put_u8(tags::ERR);
                dst.put_u32_le(*code);
                put_str(dst, message);
            }
            Self::ResultHeader { columns } => {
                dst.put_u8(tags::RESULT_HEADER);
                dst.put_u32_le(*columns);
            }
            Self::Row(values) => {
                dst.put_u8(tags::ROW);
                put_values(dst, values);
            }
            Self::Eof => dst.put_u8(tags::EOF),
            Self::PrepareOk {
                stmt_id,
                params,
                columns,
            } => {
                dst.put_u8(tags::PREPARE_OK);
                dst.put_u32_le(*stmt_id);
                dst.put_u32_le(*params);
                dst.put_u32_le(*columns);
            }
        }
        finish(dst, mark);
    }

    /// Decode one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched when the frame is not
    /// complete yet.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, FrameError> {
        let Some((tag, mut body)) = split_frame(src)? else {
            return Ok(None);
        };
        let frame = match tag {
            tags::OK => Self::Ok {
                affected: get_u64(&mut body)?,
            },
            tags::ERR => Self::Err {
                code: get_u32(&mut body)?,
                message: get_str(&mut body)?,
            },
            tags::RESULT_HEADER => Self::ResultHeader {
                columns: get_u32(&mut body)?,
            },
            tags::ROW => Self::Row(get_values(&mut body)?),
            tags::EOF => Self::Eof,
            tags::PREPARE_OK => Self::PrepareOk {
                stmt_id: get_u32(&mut body)?,
                params: get_u32(&mut body)?,
                columns: get_u32(&mut body)?,
            },
            other => return Err(FrameError::UnknownTag(other)),
        };
        expect_end(&body)?;
        Ok(Some(frame))
    }
}

fn begin(dst: &mut BytesMut) -> usize {
    let mark = dst.len();
    dst.put_u32_le(0);
    mark
}

fn finish(dst: &mut BytesMut, mark: usize) {
    let len = (dst.len() - mark - HEADER_SIZE) as u32;
    dst[mark..mark + HEADER_SIZE].copy_from_slice(&len.to_le_bytes());
}

/// Split a complete frame off `src`, returning its tag and payload.
fn split_frame(src: &mut BytesMut) -> Result<Option<(u8, Bytes)>, FrameError> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }
    let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::Oversized(len));
    }
    if len == 0 {
        return Err(FrameError::Empty);
    }
    if src.len() < HEADER_SIZE + len {
        src.reserve(HEADER_SIZE + len - src.len());
        return Ok(None);
    }
    src.advance(HEADER_SIZE);
    let mut body = src.split_to(len).freeze();
    let tag = body.get_u8();
    Ok(Some((tag, body)))
}

fn expect_end(body: &Bytes) -> Result<(), FrameError> {
    match body.remaining() {
        0 => Ok(()),
        n => Err(FrameError::Trailing(n)),
    }
}

fn put_str(dst: &mut BytesMut, s: &str) {
    dst.put_u32_le(s.len() as u32);
    dst.put_slice(s.as_bytes());
}

fn put_value(dst: &mut BytesMut, value: Option<&[u8]>) {
    match value {
        None => dst.put_u8(1),
        Some(v) => {
            dst.put_u8(0);
            dst.put_u32_le(v.len() as u32);
            dst.put_slice(v);
        }
    }
}

fn put_values(dst: &mut BytesMut, values: &[Option<Bytes>]) {
    dst.put_u32_le(values.len() as u32);
    for value in values {
        put_value(dst, value.as_deref());
    }
}

fn get_u32(body: &mut Bytes) -> Result<u32, FrameError> {
    if body.remaining() < 4 {
        return Err(FrameError::Truncated);
    }
    Ok(body.get_u32_le())
}

fn get_u64(body: &mut Bytes) -> Result<u64, FrameError> {
    if body.remaining() < 8 {
        return Err(FrameError::Truncated);
    }
    Ok(body.get_u64_le())
}

fn get_bytes(body: &mut Bytes) -> Result<Bytes, FrameError> {
    let len = get_u32(body)? as usize;
    if body.remaining() < len {
        return Err(FrameError::Truncated);
    }
    Ok(body.split_to(len))
}

fn get_str(body: &mut Bytes) -> Result<String, FrameError> {
    let raw = get_bytes(body)?;
    String::from_utf8(raw.to_vec()).map_err(|_| FrameError::InvalidUtf8)
}

fn get_value(body: &mut Bytes) -> Result<Option<Bytes>, FrameError> {
    if body.remaining() < 1 {
        return Err(FrameError::Truncated);
    }
    match body.get_u8() {
        0 => get_bytes(body).map(Some),
        _ => Ok(None),
    }
}

fn get_values(body: &mut Bytes) -> Result<Vec<Option<Bytes>>, FrameError> {
    let count = get_u32(body)? as usize;
    // Each value takes at least its null flag.
    if body.remaining() < count {
        return Err(FrameError::Truncated);
    }
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(get_value(body)?);
    }
    Ok(values)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encoded_client(frame: &ClientFrame) -> BytesMut {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        buf
    }

    #[test]
    fn test_execute_with_null_params() {
        let frame = ClientFrame::Execute {
            stmt_id: 7,
            params: vec![Some(Bytes::from_static(b"abc")), None, Some(Bytes::new())],
        };
        let mut buf = encoded_client(&frame);
        assert_eq!(ClientFrame::decode(&mut buf).unwrap(), Some(frame));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut full = encoded_client(&ClientFrame::Query("SELECT 1".into()));
        let mut partial = full.split_to(full.len() - 1);
        let before = partial.len();
        assert_eq!(ClientFrame::decode(&mut partial).unwrap(), None);
        assert_eq!(partial.len(), before);

        partial.unsplit(full);
        assert_eq!(
            ClientFrame::decode(&mut partial).unwrap(),
            Some(ClientFrame::Query("SELECT 1".into()))
        );
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut buf = BytesMut::new();
        ServerFrame::ResultHeader { columns: 2 }.encode(&mut buf);
        ServerFrame::Row(vec![None, Some(Bytes::from_static(b"x"))]).encode(&mut buf);
        ServerFrame::Eof.encode(&mut buf);

        assert_eq!(
            ServerFrame::decode(&mut buf).unwrap(),
            Some(ServerFrame::ResultHeader { columns: 2 })
        );
        assert_eq!(
            ServerFrame::decode(&mut buf).unwrap(),
            Some(ServerFrame::Row(vec![None, Some(Bytes::from_static(b"x"))]))
        );
        assert_eq!(ServerFrame::decode(&mut buf).unwrap(), Some(ServerFrame::Eof));
        assert_eq!(ServerFrame::decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_hello_without_database() {
        let frame = ClientFrame::Hello {
            user: "app".into(),
            password: String::new(),
            database: None,
        };
        let mut buf = encoded_client(&frame);
        assert_eq!(ClientFrame::decode(&mut buf).unwrap(), Some(frame));
    }

    #[test]
    fn test_unknown_tag() {
        let mut buf = BytesMut::from(&[1u8, 0, 0, 0, 0x42][..]);
        assert_eq!(
            ServerFrame::decode(&mut buf),
            Err(FrameError::UnknownTag(0x42))
        );
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let len = (MAX_FRAME_SIZE as u32) + 1;
        let mut buf = BytesMut::from(&len.to_le_bytes()[..]);
        assert!(matches!(
            ClientFrame::decode(&mut buf),
            Err(FrameError::Oversized(_))
        ));
    }

    #[test]
    fn test_truncated_payload() {
        // ERR frame whose message length points past the body.
        let mut buf = BytesMut::new();
        buf.put_u32_le(9);
        buf.put_u8(0xFF);
        buf.put_u32_le(1064);
        buf.put_u32_le(100);
        assert_eq!(ServerFrame::decode(&mut buf), Err(FrameError::Truncated));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(2);
        buf.put_u8(0xFE);
        buf.put_u8(0);
        assert_eq!(ServerFrame::decode(&mut buf), Err(FrameError::Trailing(1)));
    }
}
