use core::fmt;
use std::str::FromStr;

use arbitrary::Arbitrary;
use get_size2::GetSize;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::StandardUniform;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

use crate::error::TryFromDigestError;
use crate::error::TryFromHexDigestError;

/// The result of hashing with [Keccak-256](crate::keccak), used for leaves,
/// internal nodes and roots alike. Sometimes called a “hash”.
///
/// Digests are ordered as unsigned big-endian byte strings, which is the order
/// used to canonicalize a pair before [hashing it](crate::keccak::hash_pair).
// note: Serialize and Deserialize have custom implementations below
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, GetSize, Arbitrary,
)]
pub struct Digest(pub [u8; Digest::BYTES]);

impl Digest {
    /// The number of bytes in a digest.
    pub const BYTES: usize = 32;

    /// The all-zero digest.
    pub const ALL_ZERO: Self = Self([0; Self::BYTES]);

    pub const fn new(bytes: [u8; Self::BYTES]) -> Self {
        Self(bytes)
    }

    pub const fn values(self) -> [u8; Self::BYTES] {
        self.0
    }

    pub const fn as_bytes(&self) -> &[u8; Self::BYTES] {
        &self.0
    }

    /// Encode digest as `0x`-prefixed, lowercase hex.
    ///
    /// Since `Digest` also implements [`LowerHex`][lo] and [`UpperHex`][up], it is
    /// possible to `{:x}`-format directly, _e.g._, `print!("{digest:#x}")`.
    ///
    /// [lo]: fmt::LowerHex
    /// [up]: fmt::UpperHex
    pub fn to_hex(self) -> String {
        format!("{self:#x}")
    }

    /// Decode hex string to [`Digest`]. The leading “0x” is optional.
    pub fn try_from_hex(data: impl AsRef<[u8]>) -> Result<Self, TryFromHexDigestError> {
        let data = data.as_ref();
        let data = data.strip_prefix(b"0x").unwrap_or(data);
        let slice = hex::decode(data)?;
        Ok(Self::try_from(&slice as &[u8])?)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:#x}")
    }
}

impl fmt::LowerHex for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "0x")?;
        }
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::UpperHex for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "0x")?;
        }
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl Distribution<Digest> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Digest {
        Digest::new(rng.random())
    }
}

impl FromStr for Digest {
    type Err = TryFromHexDigestError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        Self::try_from_hex(string)
    }
}

impl From<[u8; Digest::BYTES]> for Digest {
    fn from(bytes: [u8; Digest::BYTES]) -> Self {
        Self(bytes)
    }
}

impl From<Digest> for [u8; Digest::BYTES] {
    fn from(Digest(bytes): Digest) -> Self {
        bytes
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = TryFromDigestError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        <[u8; Self::BYTES]>::try_from(slice)
            .map(Self)
            .map_err(|_e| TryFromDigestError::InvalidLength(slice.len()))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// we implement Serialize so that we can serialize as hex for human readable
// formats like JSON but use default serializer for other formats likes bincode
impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            self.to_hex().serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

// we impl Deserialize so that we can deserialize as hex for human readable
// formats like JSON but use default deserializer for other formats like bincode
impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let hex_string = String::deserialize(deserializer)?;
            Self::try_from_hex(hex_string).map_err(serde::de::Error::custom)
        } else {
            Ok(Self::new(<[u8; Self::BYTES]>::deserialize(deserializer)?))
        }
    }
}
