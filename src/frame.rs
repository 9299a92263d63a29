// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io;
use std::io::Cursor;
use std::str;

use bytes::Buf;
use bytes::Bytes;
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

// Upper bound for the element vector allocated up front from a declared array length. The header
// is client controlled, the payload bytes that back it are not there yet.
const MAX_PREALLOCATED_ELEMENTS: usize = 1024;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("protocol error; expected {expected:?}, got {actual:?}")]
    UnexpectedByte { expected: char, actual: char },
    #[error("protocol error; invalid length {0:?}")]
    InvalidLength(String),
    #[error("protocol error; line too short")]
    LineTooShort,
    #[error("protocol error; stream ended in the middle of a frame")]
    Truncated,
    #[error("protocol error; frame of {size} bytes exceeds the {limit} bytes limit")]
    FrameTooLarge { size: usize, limit: usize },
    #[error("{0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the error is about malformed bytes rather than missing ones or the transport.
    pub fn is_protocol(&self) -> bool {
        !matches!(self, Error::Incomplete | Error::Io(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// Builds the request form of a command: an array of bulk strings.
    pub fn request<I, B>(parts: I) -> Frame
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Frame::Array(parts.into_iter().map(|p| Frame::Bulk(p.into())).collect())
    }

    /// Parses one request frame, `*<n>\r\n` followed by `n` times `$<len>\r\n<bytes>\r\n`.
    ///
    /// Stray `\r` and `\n` bytes in front of the array marker are skipped. On success the cursor
    /// is left right after the last consumed byte. `Error::Incomplete` means the frame may still be
    /// valid once more bytes arrive, the cursor position is meaningless in that case.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        skip_separators(src);

        // *<number-of-elements>\r\n<element-1>...<element-n>
        let length = get_length(src, DataType::Array)?;
        let mut frames = Vec::with_capacity(length.min(MAX_PREALLOCATED_ELEMENTS));

        for _ in 0..length {
            // $<length>\r\n<data>\r\n
            let length = get_length(src, DataType::BulkString)?;
            let data = get_bulk(src, length)?;
            frames.push(Frame::Bulk(Bytes::copy_from_slice(data)));
        }

        Ok(Frame::Array(frames))
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Frame::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleString));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Error(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleError));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Integer(i) => {
                let digits = i.to_string();
                let mut bytes = Vec::with_capacity(1 + digits.len() + CRLF.len());
                bytes.push(u8::from(DataType::Integer));
                bytes.extend_from_slice(digits.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Bulk(bytes) => {
                let length_str = bytes.len().to_string();
                let mut result = Vec::with_capacity(
                    1 + length_str.len() + CRLF.len() + bytes.len() + CRLF.len(),
                );
                result.push(u8::from(DataType::BulkString));
                result.extend_from_slice(length_str.as_bytes());
                result.extend_from_slice(CRLF);
                result.extend_from_slice(bytes);
                result.extend_from_slice(CRLF);
                result
            }
            // RESP2 null bulk string.
            Frame::Null => b"$-1\r\n".to_vec(),
            Frame::Array(arr) => {
                let length_str = arr.len().to_string();
                let mut bytes = Vec::with_capacity(1 + length_str.len() + CRLF.len());
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(length_str.as_bytes());
                bytes.extend_from_slice(CRLF);
                for frame in arr {
                    bytes.extend(frame.serialize());
                }
                bytes
            }
        }
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::Null => write!(f, "$-1"),
            Frame::Array(arr) => {
                write!(f, "*{}", arr.len())?;
                for frame in arr {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
        }
    }
}

fn skip_separators(src: &mut Cursor<&[u8]>) {
    while let Some(b'\r' | b'\n') = peek_byte(src) {
        src.advance(1);
    }
}

fn peek_byte(src: &Cursor<&[u8]>) -> Option<u8> {
    src.chunk().first().copied()
}

/// Reads a `<marker><digits>\r\n` line and returns the digits as a length.
fn get_length(src: &mut Cursor<&[u8]>, expected: DataType) -> Result<usize, Error> {
    let expected = u8::from(expected);
    let actual = peek_byte(src).ok_or(Error::Incomplete)?;
    if actual != expected {
        return Err(Error::UnexpectedByte {
            expected: char::from(expected),
            actual: char::from(actual),
        });
    }

    let line = get_line(src)?;
    let digits = &line[1..];

    str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| Error::InvalidLength(String::from_utf8_lossy(digits).into_owned()))
}

/// Returns the line under the cursor without its two terminator bytes.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let newline = buf[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|index| start + index)
        .ok_or(Error::Incomplete)?;

    // Marker byte plus terminator is the shortest meaningful line.
    let line_end = newline + 1;
    if line_end - start < 1 + CRLF.len() {
        return Err(Error::LineTooShort);
    }

    src.set_position(line_end as u64);

    Ok(&buf[start..line_end - CRLF.len()])
}

/// Returns `length` payload bytes and consumes the two bytes after them without checking they are
/// a terminator.
fn get_bulk<'a>(src: &mut Cursor<&'a [u8]>, length: usize) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let end = start.checked_add(length).ok_or(Error::Incomplete)?;
    if buf.len().saturating_sub(start) < length.saturating_add(CRLF.len()) {
        return Err(Error::Incomplete);
    }

    src.set_position((end + CRLF.len()) as u64);

    Ok(&buf[start..end])
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}
