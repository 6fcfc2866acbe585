use std::io::{Read, Write};

/// Error raised while serializing a wire type.
///
/// Encoding itself is infallible; only the underlying writer can fail.
#[derive(Debug)]
pub struct EncodeError(std::io::Error);

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "encoding failed: {}", self.0)
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(inner: std::io::Error) -> Self {
        Self(inner)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Error raised while deserializing a wire type.
#[derive(Debug)]
pub enum DecodeError {
    /// The underlying reader failed or ended early.
    Io(std::io::Error),

    /// A field that must be a string held invalid UTF-8.
    Utf8(std::str::Utf8Error),

    /// A flag byte held a value no variant answers to.
    InvalidTag {
        /// The field the tag belongs to.
        field: &'static str,

        /// The offending byte.
        tag: u8,
    },

    /// The payload broke a structural rule of its format.
    Malformed(&'static str),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "decoding failed: {e}"),
            Self::Utf8(e) => write!(f, "decoding stopped at invalid utf-8: {e}"),
            Self::InvalidTag { field, tag } => {
                write!(f, "decoding found unknown tag {tag} in {field}")
            }
            Self::Malformed(rule) => write!(f, "decoding found a malformed payload: {rule}"),
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(inner: std::io::Error) -> Self {
        Self::Io(inner)
    }
}

impl From<std::str::Utf8Error> for DecodeError {
    fn from(inner: std::str::Utf8Error) -> Self {
        Self::Utf8(inner)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Utf8(e) => Some(e),
            Self::InvalidTag { .. } | Self::Malformed(_) => None,
        }
    }
}

/// A wire type that can write itself out.
pub trait Encode {
    /// Writes the canonical encoding into `writer`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the writer fails.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Buffers the canonical encoding into a fresh vector.
    #[must_use]
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)
            .expect("writing to a Vec cannot fail");
        buf
    }
}

/// A wire type that can read itself back.
pub trait Decode {
    /// Parses one value off the front of `reader`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the payload is malformed or the reader fails.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}
