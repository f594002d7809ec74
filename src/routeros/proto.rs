//! RouterOS API sentence framing.
//!
//! # Wire Format
//!
//! A sentence is a sequence of words terminated by a zero-length word. Each
//! word is prefixed with its length in a variable-width encoding:
//!
//! ```text
//! len < 0x80        1 byte   0xxxxxxx
//! len < 0x4000      2 bytes  10xxxxxx xxxxxxxx
//! len < 0x200000    3 bytes  110xxxxx ...
//! len < 0x10000000  4 bytes  1110xxxx ...
//! otherwise         5 bytes  11110000 + u32 big-endian
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::ApiError;

/// Upper bound on a single word, guarding against corrupt length prefixes.
const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

/// Append the length prefix for a word of `len` bytes.
pub fn encode_length(len: usize, buf: &mut Vec<u8>) {
    let len = len as u32;
    if len < 0x80 {
        buf.push(len as u8);
    } else if len < 0x4000 {
        buf.extend_from_slice(&((len | 0x8000) as u16).to_be_bytes());
    } else if len < 0x20_0000 {
        let v = len | 0xC0_0000;
        buf.extend_from_slice(&v.to_be_bytes()[1..]);
    } else if len < 0x1000_0000 {
        buf.extend_from_slice(&(len | 0xE000_0000).to_be_bytes());
    } else {
        buf.push(0xF0);
        buf.extend_from_slice(&len.to_be_bytes());
    }
}

/// Encode a full sentence, including the terminating empty word.
pub fn encode_sentence<S: AsRef<str>>(words: &[S]) -> Vec<u8> {
    let mut buf = Vec::new();
    for word in words {
        let bytes = word.as_ref().as_bytes();
        encode_length(bytes.len(), &mut buf);
        buf.extend_from_slice(bytes);
    }
    buf.push(0);
    buf
}

/// Read one length prefix from the stream.
pub async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<usize, ApiError> {
    let first = reader.read_u8().await?;

    let (extra, initial) = if first & 0x80 == 0x00 {
        (0, u32::from(first))
    } else if first & 0xC0 == 0x80 {
        (1, u32::from(first & 0x3F))
    } else if first & 0xE0 == 0xC0 {
        (2, u32::from(first & 0x1F))
    } else if first & 0xF0 == 0xE0 {
        (3, u32::from(first & 0x0F))
    } else if first == 0xF0 {
        (4, 0)
    } else {
        return Err(ApiError::Protocol(format!(
            "invalid length prefix byte 0x{first:02x}"
        )));
    };

    let mut len = initial;
    for _ in 0..extra {
        len = (len << 8) | u32::from(reader.read_u8().await?);
    }
    Ok(len as usize)
}

/// Read one sentence; returns its words without the terminator.
pub async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<String>, ApiError> {
    let mut words = Vec::new();
    loop {
        let len = read_length(reader).await?;
        if len == 0 {
            return Ok(words);
        }
        if len > MAX_WORD_LEN {
            return Err(ApiError::Protocol(format!("word length {len} exceeds limit")));
        }

        let mut word = vec![0u8; len];
        reader.read_exact(&mut word).await?;
        // Devices send text in their local codepage.
        words.push(String::from_utf8_lossy(&word).into_owned());
    }
}

/// Write one sentence and flush.
pub async fn write_sentence<W, S>(writer: &mut W, words: &[S]) -> Result<(), ApiError>
where
    W: AsyncWrite + Unpin,
    S: AsRef<str>,
{
    writer.write_all(&encode_sentence(words)).await?;
    writer.flush().await?;
    Ok(())
}
