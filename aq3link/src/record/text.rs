//! Fixed-width text fields.

use {
    crate::error::{Error, Result},
    std::{fmt, str::FromStr},
};

/// A NUL-padded single-byte text field of exactly `N` bytes.
///
/// Bytes are mapped to chars one-to-one (Latin-1), so decoding never fails
/// and re-encoding a decoded field reproduces it exactly.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedText<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> FixedText<N> {
    /// Wrap raw field bytes.
    pub fn from_bytes(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// Copy the field out of `buf`. `buf` must be at least `N` bytes long.
    pub(crate) fn read(buf: &[u8]) -> Self {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&buf[..N]);
        Self { bytes }
    }

    /// Raw field bytes.
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Whether the field starts with NUL.
    pub fn is_empty(&self) -> bool {
        self.bytes
            .first()
            .is_none_or(|&b| b == 0)
    }

    /// Every byte as a char, NULs and padding included.
    pub fn to_literal(&self) -> String {
        self.bytes
            .iter()
            .map(|&b| char::from(b))
            .collect()
    }

    /// Text up to the first NUL.
    pub fn to_trimmed(&self) -> String {
        crate::protocol::frame::decode_text(&self.bytes)
    }
}

impl<const N: usize> Default for FixedText<N> {
    fn default() -> Self {
        Self { bytes: [0u8; N] }
    }
}

impl<const N: usize> FromStr for FixedText<N> {
    type Err = Error;

    /// Encode `s`, truncated to `N - 1` bytes so the field stays
    /// NUL-terminated. Chars outside Latin-1 are rejected.
    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; N];
        for (slot, c) in bytes
            .iter_mut()
            .take(N.saturating_sub(1))
            .zip(s.chars())
        {
            *slot = u8::try_from(u32::from(c)).map_err(|_| {
                Error::InvalidRecord(format!("character {c:?} cannot be stored in a text field"))
            })?;
        }
        Ok(Self { bytes })
    }
}

impl<const N: usize> fmt::Display for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_trimmed())
    }
}

impl<const N: usize> fmt::Debug for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_trimmed())
    }
}

#[cfg(feature = "serde")]
impl<const N: usize> serde::Serialize for FixedText<N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_trimmed())
    }
}
