//! Binary framing for records relayed from a follower to the aggregator.
//!
//! One record per frame: a one-byte severity tag, a big-endian length, then
//! the UTF-8 text. The tag travels out of band, so the text arrives
//! byte-for-byte intact even when its first character happens to share a
//! code point with a severity value.

use crate::domain::{LogRecord, Severity};
use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on the text payload of one frame.
pub const MAX_TEXT_LEN: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Record text too large: {0} bytes")]
    Oversized(usize),

    #[error("Record text is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode one record into a buffer ready for a single write.
pub fn encode_record(record: &LogRecord) -> Result<BytesMut, WireError> {
    let text = record.text.as_bytes();
    if text.len() > MAX_TEXT_LEN {
        return Err(WireError::Oversized(text.len()));
    }
    let mut buf = BytesMut::with_capacity(1 + 4 + text.len());
    buf.put_u8(record.severity.wire_tag());
    buf.put_u32(text.len() as u32);
    buf.put_slice(text);
    Ok(buf)
}

/// Write one framed record to the transport.
pub async fn write_record<W>(writer: &mut W, record: &LogRecord) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let buf = encode_record(record)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed record from the transport.
///
/// An unrecognized severity tag decodes to [`Severity::Unknown`]; a length
/// beyond [`MAX_TEXT_LEN`] or malformed text is an error, and the caller is
/// expected to close the connection.
pub async fn read_record<R>(reader: &mut R) -> Result<LogRecord, WireError>
where
    R: AsyncRead + Unpin,
{
    let tag = reader.read_u8().await?;
    let len = reader.read_u32().await? as usize;
    if len > MAX_TEXT_LEN {
        return Err(WireError::Oversized(len));
    }
    let mut text = vec![0u8; len];
    reader.read_exact(&mut text).await?;
    Ok(LogRecord {
        severity: Severity::from_wire(tag),
        text: String::from_utf8(text)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn round_trip(record: &LogRecord) -> LogRecord {
        let (mut tx, mut rx) = tokio::io::duplex(MAX_TEXT_LEN + 16);
        write_record(&mut tx, record).await.unwrap();
        read_record(&mut rx).await.unwrap()
    }

    #[tokio::test]
    async fn record_round_trips() {
        let record = LogRecord::new(Severity::Critical, "disk full");
        assert_eq!(round_trip(&record).await, record);
    }

    #[tokio::test]
    async fn text_starting_with_severity_code_point_survives() {
        // The original encoding overwrote the first character of the text
        // with the severity tag; with out-of-band framing a leading
        // control character must come back untouched and must not corrupt
        // severity decoding.
        let record = LogRecord::new(Severity::Warning, "\u{0003} looks like a tag");
        let decoded = round_trip(&record).await;
        assert_eq!(decoded.severity, Severity::Warning);
        assert_eq!(decoded.text, "\u{0003} looks like a tag");
    }

    #[tokio::test]
    async fn empty_text_round_trips() {
        let record = LogRecord::new(Severity::Debug, "");
        assert_eq!(round_trip(&record).await, record);
    }

    #[tokio::test]
    async fn unknown_tag_decodes_to_unknown_severity() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let mut buf = BytesMut::new();
        buf.put_u8(9);
        buf.put_u32(2);
        buf.put_slice(b"hi");
        tx.write_all(&buf).await.unwrap();

        let decoded = read_record(&mut rx).await.unwrap();
        assert_eq!(decoded.severity, Severity::Unknown);
        assert_eq!(decoded.text, "hi");
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_u32((MAX_TEXT_LEN + 1) as u32);
        tx.write_all(&buf).await.unwrap();

        assert!(matches!(
            read_record(&mut rx).await,
            Err(WireError::Oversized(_))
        ));
    }

    #[test]
    fn oversized_text_is_not_encoded() {
        let record = LogRecord::new(Severity::Debug, "x".repeat(MAX_TEXT_LEN + 1));
        assert!(matches!(
            encode_record(&record),
            Err(WireError::Oversized(_))
        ));
    }

    #[tokio::test]
    async fn truncated_frame_is_an_error() {
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_u32(10);
        buf.put_slice(b"short");
        tx.write_all(&buf).await.unwrap();
        drop(tx);

        assert!(matches!(read_record(&mut rx).await, Err(WireError::Io(_))));
    }
}
