use std::sync::Arc;

/// Immutable, reference-counted byte buffer.
///
/// Cloning is a pointer bump; the bytes themselves are shared and never
/// mutated after construction. Keys, values, raw feed blocks and encoded
/// indexes all travel through this type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Slice(Arc<[u8]>);

impl Slice {
    /// A buffer of length zero.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// Reads exactly `len` bytes off the front of `reader`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the reader ends early or fails.
    pub fn from_reader<R: std::io::Read>(reader: &mut R, len: usize) -> std::io::Result<Self> {
        let mut buf = vec![0; len];
        reader.read_exact(&mut buf)?;
        Ok(Self(buf.into()))
    }

    /// Number of bytes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies the bytes into a fresh `Vec`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl std::ops::Deref for Slice {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Slice {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Slice {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl From<Vec<u8>> for Slice {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl<const N: usize> From<[u8; N]> for Slice {
    fn from(bytes: [u8; N]) -> Self {
        bytes.as_slice().into()
    }
}

impl From<&str> for Slice {
    fn from(text: &str) -> Self {
        text.as_bytes().into()
    }
}

impl From<String> for Slice {
    fn from(text: String) -> Self {
        text.into_bytes().into()
    }
}
