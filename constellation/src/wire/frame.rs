//! Payload framing.
//!
//! ```text
//! ┌──────────┬──────────────────────┬──────────────┬─────────────────────────┐
//! │ has_body │ body_len, body       │ buffer_count │ (len, bytes) per buffer │
//! │  1 byte  │ 4 + n bytes, if set  │   4 bytes    │ 4 + n bytes each        │
//! └──────────┴──────────────────────┴──────────────┴─────────────────────────┘
//! ```
//!
//! All integers are little-endian `u32`. Raw buffers follow the body so they
//! are copied once instead of being re-encoded inside it.

use crate::error::WireError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub body: Option<Vec<u8>>,
    pub buffers: Vec<Vec<u8>>,
}

impl Frame {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_body(body: Vec<u8>) -> Self {
        Self {
            body: Some(body),
            buffers: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let body_len = self.body.as_ref().map(|b| 4 + b.len()).unwrap_or(0);
        let buffers_len: usize = self.buffers.iter().map(|b| 4 + b.len()).sum();
        let mut out = Vec::with_capacity(1 + body_len + 4 + buffers_len);

        match &self.body {
            Some(body) => {
                out.push(1);
                out.extend_from_slice(&(body.len() as u32).to_le_bytes());
                out.extend_from_slice(body);
            }
            None => out.push(0),
        }
        out.extend_from_slice(&(self.buffers.len() as u32).to_le_bytes());
        for buffer in &self.buffers {
            out.extend_from_slice(&(buffer.len() as u32).to_le_bytes());
            out.extend_from_slice(buffer);
        }
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader { bytes, offset: 0 };
        let body = match reader.take(1)?[0] {
            0 => None,
            _ => {
                let len = reader.read_u32()? as usize;
                Some(reader.take(len)?.to_vec())
            }
        };
        let count = reader.read_u32()? as usize;
        let mut buffers = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let len = reader.read_u32()? as usize;
            buffers.push(reader.take(len)?.to_vec());
        }
        Ok(Self { body, buffers })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let available = self.bytes.len() - self.offset;
        if len > available {
            return Err(WireError::Truncated {
                needed: len,
                available,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame_layout() {
        assert_eq!(Frame::empty().to_bytes(), vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_buffers_follow_body() {
        let frame = Frame {
            body: Some(vec![9, 9]),
            buffers: vec![vec![1], vec![]],
        };
        let bytes = frame.to_bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..5], &2u32.to_le_bytes());
        assert_eq!(&bytes[7..11], &2u32.to_le_bytes());
        assert_eq!(Frame::parse(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let mut bytes = Frame::with_body(vec![1, 2, 3]).to_bytes();
        bytes.truncate(4);
        assert!(matches!(Frame::parse(&bytes), Err(WireError::Truncated { .. })));
        assert!(Frame::parse(&[]).is_err());
    }
}
