//! Byte order negotiation tag

use super::WireError;

/// Native byte order of a peer, sent as one byte during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ByteOrder {
    Little = 0,
    Big = 1,
    Other = 2,
}

impl ByteOrder {
    /// Byte order of the running process
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Other
        }
    }

    /// Whether two peers with these orders must swap multi-byte fields
    pub fn needs_swap(self, peer: ByteOrder) -> bool {
        self != peer || self == ByteOrder::Other || peer == ByteOrder::Other
    }
}

impl TryFrom<u8> for ByteOrder {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ByteOrder::Little),
            1 => Ok(ByteOrder::Big),
            2 => Ok(ByteOrder::Other),
            other => Err(WireError::UnknownByteOrder(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_swap() {
        assert!(!ByteOrder::Little.needs_swap(ByteOrder::Little));
        assert!(!ByteOrder::Big.needs_swap(ByteOrder::Big));
        assert!(ByteOrder::Little.needs_swap(ByteOrder::Big));
        assert!(ByteOrder::Big.needs_swap(ByteOrder::Little));
        assert!(ByteOrder::Other.needs_swap(ByteOrder::Other));
        assert!(ByteOrder::Little.needs_swap(ByteOrder::Other));
    }

    #[test]
    fn test_tag_roundtrip() {
        for order in [ByteOrder::Little, ByteOrder::Big, ByteOrder::Other] {
            assert_eq!(ByteOrder::try_from(order as u8).unwrap(), order);
        }
        assert!(matches!(ByteOrder::try_from(9), Err(WireError::UnknownByteOrder(9))));
    }
}
