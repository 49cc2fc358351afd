//! RouterOS API sentence codec.
//!
//! A sentence is a sequence of words terminated by a zero-length word. Each
//! word is prefixed with its length in a variable-width encoding:
//!
//! | Length            | Prefix bytes | Leading bits |
//! |-------------------|--------------|--------------|
//! | `< 0x80`          | 1            | `0xxxxxxx`   |
//! | `< 0x4000`        | 2            | `10xxxxxx`   |
//! | `< 0x20_0000`     | 3            | `110xxxxx`   |
//! | `< 0x1000_0000`   | 4            | `1110xxxx`   |
//! | otherwise         | 5            | `11110000`   |
//!
//! Lengths are big-endian after masking the leading bits. Words are opaque
//! bytes at this layer: RouterOS sends values in the router's codepage, so
//! text decoding happens when a reply is parsed. This module is pure data;
//! [`SentenceCodec`] plugs it into `tokio_util::codec::Framed`.

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// One received protocol message, word by word.
pub type Sentence = Vec<Bytes>;

/// Words longer than this are treated as stream corruption.
const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid length prefix byte 0x{0:02x}")]
    InvalidPrefix(u8),
    #[error("word of {0} bytes exceeds limit")]
    WordTooLong(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Append the length prefix for a word of `len` bytes.
pub fn encode_length(len: usize, dst: &mut BytesMut) {
    let len = len as u32;
    if len < 0x80 {
        dst.put_u8(len as u8);
    } else if len < 0x4000 {
        dst.put_u16((len | 0x8000) as u16);
    } else if len < 0x20_0000 {
        let v = len | 0xC0_0000;
        dst.put_u8((v >> 16) as u8);
        dst.put_u16(v as u16);
    } else if len < 0x1000_0000 {
        dst.put_u32(len | 0xE000_0000);
    } else {
        dst.put_u8(0xF0);
        dst.put_u32(len);
    }
}

/// Read a length prefix from the start of `src`.
///
/// Returns `(length, prefix_size)`, or `None` if `src` is too short.
pub fn decode_length(src: &[u8]) -> Result<Option<(usize, usize)>, CodecError> {
    let Some(&b0) = src.first() else {
        return Ok(None);
    };
    let size = match b0 {
        0x00..=0x7F => 1,
        0x80..=0xBF => 2,
        0xC0..=0xDF => 3,
        0xE0..=0xEF => 4,
        0xF0 => 5,
        other => return Err(CodecError::InvalidPrefix(other)),
    };
    if src.len() < size {
        return Ok(None);
    }
    let len = match size {
        1 => u32::from(b0),
        2 => (u32::from(b0 & 0x3F) << 8) | u32::from(src[1]),
        3 => (u32::from(b0 & 0x1F) << 16) | (u32::from(src[1]) << 8) | u32::from(src[2]),
        4 => {
            (u32::from(b0 & 0x0F) << 24)
                | (u32::from(src[1]) << 16)
                | (u32::from(src[2]) << 8)
                | u32::from(src[3])
        }
        _ => u32::from_be_bytes([src[1], src[2], src[3], src[4]]),
    };
    Ok(Some((len as usize, size)))
}

/// Append one length-prefixed word.
pub fn encode_word<W: AsRef<[u8]>>(word: W, dst: &mut BytesMut) {
    let word = word.as_ref();
    encode_length(word.len(), dst);
    dst.put_slice(word);
}

/// Encode a full sentence, including the terminating empty word.
pub fn encode_sentence<W: AsRef<[u8]>>(words: &[W], dst: &mut BytesMut) {
    for word in words {
        encode_word(word, dst);
    }
    dst.put_u8(0);
}

/// Frames RouterOS sentences on a byte stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct SentenceCodec;

impl Decoder for SentenceCodec {
    type Item = Sentence;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Sentence>, CodecError> {
        loop {
            // Walk the buffer without consuming until a whole sentence is present.
            let mut offset = 0;
            let mut spans = Vec::new();
            loop {
                let Some((len, size)) = decode_length(&src[offset..])? else {
                    return Ok(None);
                };
                if len > MAX_WORD_LEN {
                    return Err(CodecError::WordTooLong(len));
                }
                offset += size;
                if len == 0 {
                    break;
                }
                if src.len() < offset + len {
                    src.reserve(offset + len - src.len());
                    return Ok(None);
                }
                spans.push(offset..offset + len);
                offset += len;
            }

            let frame = src.split_to(offset).freeze();
            if spans.is_empty() {
                // Stray terminator; nothing to deliver.
                continue;
            }
            return Ok(Some(spans.into_iter().map(|span| frame.slice(span)).collect()));
        }
    }
}

impl<W: AsRef<[u8]>> Encoder<Vec<W>> for SentenceCodec {
    type Error = CodecError;

    fn encode(&mut self, words: Vec<W>, dst: &mut BytesMut) -> Result<(), CodecError> {
        encode_sentence(&words, dst);
        Ok(())
    }
}

/// Decode every word in `src` until the terminator.
#[cfg(test)]
pub fn decode_sentence(mut src: &[u8]) -> Result<Option<Sentence>, CodecError> {
    use bytes::Buf;

    let mut words = Vec::new();
    loop {
        let Some((len, size)) = decode_length(src)? else {
            return Ok(None);
        };
        src.advance(size);
        if len == 0 {
            return Ok(Some(words));
        }
        if src.len() < len {
            return Ok(None);
        }
        words.push(Bytes::copy_from_slice(&src[..len]));
        src.advance(len);
    }
}
