/// Line codec — frames a TCP byte stream into chat lines.
///
/// Splits on `\n`, tolerates a preceding `\r` (telnet-style clients), and
/// serializes outgoing lines with a bare `\n` terminator.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum line length (excluding the terminator).
pub const MAX_LINE_LENGTH: usize = 8191;

/// Codec error: either an over-long line or an I/O error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("line exceeds maximum length ({MAX_LINE_LENGTH} bytes)")]
    LineTooLong,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A tokio codec that frames UTF-8 lines on `\n` boundaries.
#[derive(Debug, Default)]
pub struct LineCodec;

impl LineCodec {
    fn take_line(src: &mut BytesMut, len: usize, skip: usize) -> Result<String, CodecError> {
        let mut line_bytes = src.split_to(len);
        src.advance(skip);

        if line_bytes.last() == Some(&b'\r') {
            line_bytes.truncate(line_bytes.len() - 1);
        }
        if line_bytes.len() > MAX_LINE_LENGTH {
            return Err(CodecError::LineTooLong);
        }

        let line = std::str::from_utf8(&line_bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(line.to_owned())
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.iter().position(|b| *b == b'\n') {
            Some(pos) => Self::take_line(src, pos, 1).map(Some),
            None => {
                // No complete line yet. +1 leaves room for a trailing `\r`.
                if src.len() > MAX_LINE_LENGTH + 1 {
                    return Err(CodecError::LineTooLong);
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Peer closed without a final newline: hand over what is left.
        let len = src.len();
        Self::take_line(src, len, 0).map(Some)
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.as_ref();
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
