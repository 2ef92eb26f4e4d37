//! Protocol identifier types.

use std::fmt;

#[cfg(feature = "codec")]
use bincode::{Decode, Encode};

use crate::error::{Error, Result};

/// A 160-bit identifier that implements a non-euclidian XOR-based distance metric.
///
/// The identifier doubles as a path through the routing trie: bit `0` is the most-significant
/// bit of the first byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "codec", derive(Encode, Decode))]
pub struct Id {
    bytes: [u8; Self::BYTES],
}

impl Id {
    /// The size of the identifier in bytes.
    pub const BYTES: usize = 20;

    /// The size of the identifier in bits.
    pub const BITS: usize = 20 * 8;

    /// Creates a new identifier from the supplied bytes.
    pub fn new(bytes: [u8; Self::BYTES]) -> Self {
        Id { bytes }
    }

    /// Creates a new identifier from a slice, failing if it isn't exactly [`Id::BYTES`] long.
    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self> {
        let bytes = bytes.as_ref();
        let bytes: [u8; Self::BYTES] = bytes
            .try_into()
            .map_err(|_| Error::InvalidIdSize(bytes.len()))?;

        Ok(Id { bytes })
    }

    /// Returns the bytes backing the identifier.
    pub fn bytes(&self) -> [u8; Self::BYTES] {
        self.bytes
    }

    /// Generates a random identifier.
    pub fn rand() -> Self {
        use rand::{thread_rng, Rng};

        Self {
            bytes: thread_rng().gen(),
        }
    }

    #[cfg(test)]
    /// Convenience function for working with small identifiers during testing, the value is
    /// written to the most-significant bytes so it lands near the root of the trie.
    pub fn from_u16(raw: u16) -> Self {
        let mut bytes = [0u8; Self::BYTES];
        bytes[..2].copy_from_slice(&raw.to_be_bytes());

        Self { bytes }
    }

    /// Returns the value of the bit at `index` (0 is the most-significant bit), `false` if the
    /// index is out of range.
    pub fn bit(&self, index: usize) -> bool {
        if index >= Self::BITS {
            return false;
        }

        // The left shift selects the bit within the byte, counting from the most-significant end.
        self.bytes[index / 8] & (0x80 >> (index % 8)) != 0
    }

    /// Computes the XOR-based distance between two identifiers.
    pub fn distance(&self, other: &Id) -> Distance {
        let mut bytes = [0u8; Self::BYTES];
        for (d, (a, b)) in bytes
            .iter_mut()
            .zip(self.bytes.iter().zip(other.bytes.iter()))
        {
            *d = a ^ b;
        }

        Distance(bytes)
    }
}

impl From<[u8; Id::BYTES]> for Id {
    fn from(bytes: [u8; Id::BYTES]) -> Self {
        Id::new(bytes)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.bytes {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

/// The XOR of two identifiers, ordered as a big-endian unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "codec", derive(Encode, Decode))]
pub struct Distance([u8; Id::BYTES]);

impl Distance {
    /// Returns the bytes backing the distance.
    pub fn bytes(&self) -> [u8; Id::BYTES] {
        self.0
    }

    /// Returns the number of leading zero bits, i.e. the length of the prefix both identifiers
    /// share.
    pub fn leading_zeros(&self) -> u32 {
        let mut zeros = 0;
        for byte in &self.0 {
            zeros += byte.leading_zeros();
            if *byte != 0 {
                break;
            }
        }

        zeros
    }
}
