//! Event record encoding.
//!
//! Wire layout, native byte order, no padding and no length prefix (records
//! are framed by the transport):
//!
//! ```text
//! 0..2  kind tag (u16)
//! 2..6  length   (u32)
//! ```

use crate::kind::OperationKind;

/// Size of an encoded event record in bytes
pub const EVENT_SIZE: usize = 6;

/// One observed operation: what kind, how many bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IoEvent {
    pub kind: OperationKind,
    pub len: u32,
}

/// Reasons a record cannot be decoded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer than [`EVENT_SIZE`] bytes
    Truncated { len: usize },
    /// Tag outside the known kinds
    UnknownKind { tag: u16 },
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::Truncated { len } => {
                write!(f, "record of {len} bytes is shorter than {EVENT_SIZE}")
            }
            DecodeError::UnknownKind { tag } => write!(f, "unknown operation tag {tag}"),
        }
    }
}

impl IoEvent {
    #[must_use]
    pub const fn new(kind: OperationKind, len: u32) -> Self {
        Self { kind, len }
    }

    /// Encode into the fixed wire record
    #[must_use]
    pub fn encode(&self) -> [u8; EVENT_SIZE] {
        let tag = self.kind.tag().to_ne_bytes();
        let len = self.len.to_ne_bytes();
        [tag[0], tag[1], len[0], len[1], len[2], len[3]]
    }

    /// Decode a record produced by [`encode`](Self::encode).
    ///
    /// Trailing bytes beyond [`EVENT_SIZE`] are ignored (kernel ring buffer
    /// records are padded to 8 bytes).
    ///
    /// # Errors
    /// Returns [`DecodeError`] for short records or unknown tags.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < EVENT_SIZE {
            return Err(DecodeError::Truncated { len: bytes.len() });
        }
        let tag = u16::from_ne_bytes([bytes[0], bytes[1]]);
        let len = u32::from_ne_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        let kind = OperationKind::from_tag(tag).ok_or(DecodeError::UnknownKind { tag })?;
        Ok(Self { kind, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let record = IoEvent::new(OperationKind::Writev, 125).encode();
        assert_eq!(u16::from_ne_bytes([record[0], record[1]]), 3);
        assert_eq!(u32::from_ne_bytes([record[2], record[3], record[4], record[5]]), 125);
    }

    #[test]
    fn test_decode_ignores_padding() {
        let mut padded = [0u8; 8];
        padded[..EVENT_SIZE].copy_from_slice(&IoEvent::new(OperationKind::SendMsg, 60).encode());
        assert_eq!(IoEvent::decode(&padded), Ok(IoEvent::new(OperationKind::SendMsg, 60)));
    }

    #[test]
    fn test_decode_rejects_short_record() {
        assert_eq!(IoEvent::decode(&[1, 0, 0]), Err(DecodeError::Truncated { len: 3 }));
    }

    #[test]
    fn test_decode_rejects_zeroed_record() {
        assert_eq!(IoEvent::decode(&[0; EVENT_SIZE]), Err(DecodeError::UnknownKind { tag: 0 }));
    }
}
