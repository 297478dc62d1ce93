//! Names stored in fixed-width or NUL-terminated fields.

use std::borrow::Cow;
use std::fmt;

/// Raw bytes of a name field with the trailing NUL padding removed.
///
/// Nothing else is interpreted: bytes after an embedded NUL and bytes that are
/// not UTF-8 are kept, so a decoded name writes back to the same field.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Name(Vec<u8>);

impl Name {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Name(bytes.into())
    }

    /// Reads a whole fixed-width field. A name may fill the field with no
    /// terminator.
    pub fn from_field(field: &[u8]) -> Self {
        let end = field.iter().rposition(|&b| b != 0).map_or(0, |last| last + 1);
        Name(field[..end].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The part an engine reads: everything before the first NUL.
    pub fn text(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// [`Name::text`] as `&str`, `None` when it is not UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.text()).ok()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.text())
    }

    /// Writes exactly `width` bytes, NUL padded. Longer names are cut.
    pub(crate) fn write_field(&self, out: &mut Vec<u8>, width: usize) {
        let len = self.0.len().min(width);
        if len < self.0.len() {
            tracing::warn!(value = %self, width, "name truncated to fit fixed-width field");
        }
        out.extend_from_slice(&self.0[..len]);
        out.resize(out.len() + (width - len), 0);
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name(value.as_bytes().to_vec())
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name(value.into_bytes())
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.text() == other.as_bytes()
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.text() == other.as_bytes()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &Name, width: usize) -> Vec<u8> {
        let mut out = Vec::new();
        name.write_field(&mut out, width);
        out
    }

    #[test]
    fn padded_field_round_trip() {
        let name = Name::from("e1m1");
        let out = field(&name, 16);
        assert_eq!(out.len(), 16);
        assert_eq!(Name::from_field(&out), name);
        assert_eq!(Name::from_field(&out), "e1m1");
    }

    #[test]
    fn full_width_name_has_no_terminator() {
        let bytes = [b'a'; 16];
        let name = Name::from_field(&bytes);
        assert_eq!(name.len(), 16);
        assert_eq!(field(&name, 16), bytes);
    }

    #[test]
    fn bytes_after_the_terminator_survive() {
        let mut bytes = b"wall\0xyz".to_vec();
        bytes.resize(32, 0);
        let name = Name::from_field(&bytes);
        assert_eq!(name, "wall");
        assert_eq!(name.text(), b"wall");
        assert_eq!(field(&name, 32), bytes);
    }

    #[test]
    fn non_utf8_bytes_survive() {
        let mut bytes = b"caf\xE9".to_vec();
        bytes.resize(16, 0);
        let name = Name::from_field(&bytes);
        assert_eq!(name.as_str(), None);
        assert_eq!(name.to_string_lossy(), "caf\u{FFFD}");
        assert_eq!(field(&name, 16), bytes);
    }

    #[test]
    fn long_names_are_cut_to_the_field() {
        assert_eq!(field(&Name::from("abcdefgh"), 4), b"abcd");
        assert_eq!(Name::from_field(&[0; 8]), Name::default());
    }
}
