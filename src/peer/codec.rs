// Pull response framing: `key: i64 BE | len: u32 BE | value`.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_PULL_FRAME_BYTES;
use crate::manifest::FragmentKey;

const HEADER_LEN: usize = 8 + 4;

/// Body of a pull call: the fragments wanted, in priority order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub fragment_keys: Vec<FragmentKey>,
}

/// One streamed response item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullItem {
    pub fragment_key: FragmentKey,
    pub fragment_value: Bytes,
}

#[derive(Debug, Clone)]
pub struct PullItemCodec {
    max_frame_len: usize,
}

impl PullItemCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for PullItemCodec {
    fn default() -> Self {
        Self::new(MAX_PULL_FRAME_BYTES)
    }
}

impl Decoder for PullItemCodec {
    type Item = PullItem;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<PullItem>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = &src[..HEADER_LEN];
        let fragment_key = header.get_i64();
        let len = header.get_u32() as usize;
        if len > self.max_frame_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "pull frame for fragment {} is {} bytes (limit {})",
                    fragment_key, len, self.max_frame_len
                ),
            ));
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let fragment_value = src.split_to(len).freeze();
        Ok(Some(PullItem {
            fragment_key,
            fragment_value,
        }))
    }
}

impl Encoder<PullItem> for PullItemCodec {
    type Error = io::Error;

    fn encode(&mut self, item: PullItem, dst: &mut BytesMut) -> io::Result<()> {
        let len = item.fragment_value.len();
        if len > self.max_frame_len || len > u32::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "fragment {} value is {} bytes (limit {})",
                    item.fragment_key, len, self.max_frame_len
                ),
            ));
        }
        dst.reserve(HEADER_LEN + len);
        dst.put_i64(item.fragment_key);
        dst.put_u32(len as u32);
        dst.extend_from_slice(&item.fragment_value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: FragmentKey, value: &'static [u8]) -> PullItem {
        PullItem {
            fragment_key: key,
            fragment_value: Bytes::from_static(value),
        }
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let mut codec = PullItemCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(item(5, b"hello"), &mut buf).unwrap();
        let full = buf.split().freeze();

        // Feed the frame one byte at a time.
        let mut partial = BytesMut::new();
        for (i, b) in full.iter().enumerate() {
            partial.put_u8(*b);
            let decoded = codec.decode(&mut partial).unwrap();
            if i + 1 < full.len() {
                assert!(decoded.is_none());
            } else {
                assert_eq!(decoded, Some(item(5, b"hello")));
            }
        }
        assert!(partial.is_empty());
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut codec = PullItemCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(item(-1, b""), &mut buf).unwrap();
        codec.encode(item(i64::MAX, b"xyz"), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(item(-1, b"")));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(item(i64::MAX, b"xyz")));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let mut codec = PullItemCodec::new(4);
        let mut buf = BytesMut::new();
        assert!(codec.encode(item(1, b"too long"), &mut buf).is_err());

        buf.put_i64(1);
        buf.put_u32(5);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_stream_is_error_at_eof() {
        let mut codec = PullItemCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(item(2, b"abcdef"), &mut buf).unwrap();
        buf.truncate(buf.len() - 2);
        assert!(codec.decode_eof(&mut buf).is_err());
    }

    #[test]
    fn test_request_json_shape() {
        let req = PullRequest {
            fragment_keys: vec![3, 1, 4],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"fragment_keys":[3,1,4]}"#);
    }
}
