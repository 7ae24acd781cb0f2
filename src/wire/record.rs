//! Derive-serialized records carried inside counted byte vectors
//!
//! Record layouts come from `rkyv` derives, so adding a field changes both
//! ends at once. The archived format is fixed little-endian and does not take
//! part in byte swapping.

use super::WireError;

/// A structured message framed as one counted byte vector
pub trait WireRecord: Sized {
    fn to_record_bytes(&self) -> Result<Vec<u8>, WireError>;
    fn from_record_bytes(bytes: &[u8]) -> Result<Self, WireError>;
}

/// Implement [`WireRecord`] for types deriving `rkyv::{Archive, Serialize, Deserialize}`
macro_rules! wire_record {
    ($($ty:ty),* $(,)?) => {$(
        impl $crate::wire::WireRecord for $ty {
            fn to_record_bytes(&self) -> Result<Vec<u8>, $crate::wire::WireError> {
                rkyv::to_bytes::<rkyv::rancor::Error>(self)
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| $crate::wire::WireError::MalformedRecord(e.to_string()))
            }

            fn from_record_bytes(bytes: &[u8]) -> Result<Self, $crate::wire::WireError> {
                // Received buffers carry no alignment guarantee
                let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
                aligned.extend_from_slice(bytes);
                rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
                    .map_err(|e| $crate::wire::WireError::MalformedRecord(e.to_string()))
            }
        }
    )*};
}

pub(crate) use wire_record;
