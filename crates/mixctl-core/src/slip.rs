//! SLIP framing codec (RFC 1055-style byte stuffing).
//!
//! The mixer speaks OSC over a continuous serial byte stream, so each
//! message payload is delimited with the SLIP `END` byte and the reserved
//! bytes inside the payload are escaped:
//!
//! - `END` (0xC0) → `ESC ESC_END`
//! - `ESC` (0xDB) → `ESC ESC_ESC`
//!
//! Frames are both prefixed and suffixed with `END`; the leading `END`
//! doubles as a flush of any line noise on the receiver side. Empty frames
//! (consecutive `END` bytes) are skipped while reading, which also makes
//! bare `END` bytes usable as keep-alives.
//!
//! Decoding distinguishes two failure classes: a malformed or truncated
//! escape sequence is a [`MixerError::Framing`] (the stream is
//! desynchronized and the connection should be re-established), while a
//! zero-byte read means the device went away ([`MixerError::Disconnected`]).

use crate::error::{MixerError, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Frame delimiter.
pub const END: u8 = 0xC0;
/// Escape introducer.
pub const ESC: u8 = 0xDB;
/// Escaped substitute for `END`.
pub const ESC_END: u8 = 0xDC;
/// Escaped substitute for `ESC`.
pub const ESC_ESC: u8 = 0xDD;

/// Encode `payload` as a single SLIP frame, including both delimiters.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.push(END);
    for &b in payload {
        match b {
            END => frame.extend_from_slice(&[ESC, ESC_END]),
            ESC => frame.extend_from_slice(&[ESC, ESC_ESC]),
            _ => frame.push(b),
        }
    }
    frame.push(END);
    frame
}

/// Read one frame from `reader`, unescaping the payload.
///
/// Consumes bytes until a non-empty frame is terminated by `END`. Callers
/// bound this with `tokio::time::timeout`; the function itself blocks until
/// a frame arrives or the stream fails.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    loop {
        match read_byte(reader).await? {
            END => {
                if payload.is_empty() {
                    // Leading delimiter or inter-frame keep-alive.
                    continue;
                }
                return Ok(payload);
            }
            ESC => {
                let escaped = match read_byte(reader).await {
                    Ok(b) => b,
                    Err(MixerError::Disconnected) => {
                        return Err(MixerError::Framing("frame truncated mid-escape".into()))
                    }
                    Err(e) => return Err(e),
                };
                match escaped {
                    ESC_END => payload.push(END),
                    ESC_ESC => payload.push(ESC),
                    other => {
                        return Err(MixerError::Framing(format!(
                            "invalid escape byte {other:#04x}"
                        )))
                    }
                }
            }
            plain => payload.push(plain),
        }
    }
}

async fn read_byte<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Err(MixerError::Disconnected);
    }
    Ok(buf[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn decode(bytes: &[u8]) -> Result<Vec<u8>> {
        let mut cursor = std::io::Cursor::new(bytes.to_vec());
        read_frame(&mut cursor).await
    }

    #[tokio::test]
    async fn round_trip_plain_payload() {
        let payload = b"/ch/0/mix/1/level\0\0\0,\0\0\0";
        let decoded = decode(&encode_frame(payload)).await.unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn round_trip_with_reserved_bytes() {
        // END and ESC in every position: start, middle, end, adjacent.
        let payload = [END, 0x01, ESC, ESC, 0x02, END, END, ESC];
        let frame = encode_frame(&payload);
        // No unescaped reserved byte inside the frame body.
        assert!(!frame[1..frame.len() - 1].contains(&END));
        let decoded = decode(&frame).await.unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn keepalive_ends_are_skipped() {
        let mut stream = vec![END, END, END];
        stream.extend_from_slice(&encode_frame(b"hello"));
        let decoded = decode(&stream).await.unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[tokio::test]
    async fn invalid_escape_is_framing_error() {
        let stream = [END, 0x01, ESC, 0x41, END];
        match decode(&stream).await {
            Err(MixerError::Framing(msg)) => assert!(msg.contains("0x41")),
            other => panic!("expected framing error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_escape_is_framing_error() {
        let stream = [END, 0x01, ESC];
        assert!(matches!(
            decode(&stream).await,
            Err(MixerError::Framing(_))
        ));
    }

    #[tokio::test]
    async fn closed_stream_is_disconnected() {
        // Frame never terminated before EOF.
        let stream = [END, 0x01, 0x02];
        assert!(matches!(
            decode(&stream).await,
            Err(MixerError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn incremental_read_across_chunks() {
        let (mut host, mut device) = tokio::io::duplex(8);
        let frame = encode_frame(&[0x10, END, 0x20]);
        let reader = tokio::spawn(async move { read_frame(&mut device).await });
        // Dribble the frame in two writes.
        host.write_all(&frame[..3]).await.unwrap();
        tokio::task::yield_now().await;
        host.write_all(&frame[3..]).await.unwrap();
        let decoded = reader.await.unwrap().unwrap();
        assert_eq!(decoded, [0x10, END, 0x20]);
    }
}
