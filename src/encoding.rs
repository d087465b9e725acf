//! Character encodings for header and boundary text.
//!
//! Only header blocks pass through a [`HeaderEncoding`]; part bodies are
//! delivered byte for byte.

use std::borrow::Cow;

use crate::error::MalformedPayload;

/// Encoding used to decode and encode header text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeaderEncoding {
    /// UTF-8, the default for JSON batches.
    #[default]
    Utf8,
    /// ISO-8859-1; every byte maps to the code point of the same value.
    Latin1,
    /// 7-bit US-ASCII; bytes above `0x7f` are rejected.
    Ascii,
}

impl HeaderEncoding {
    /// Name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Latin1 => "ISO-8859-1",
            Self::Ascii => "US-ASCII",
        }
    }

    /// Decode header bytes into text.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload::InvalidHeaderEncoding`] when the bytes are
    /// not valid in this encoding.
    ///
    /// # Examples
    ///
    /// ```
    /// use batchframe::HeaderEncoding;
    ///
    /// let text = HeaderEncoding::Latin1.decode(b"caf\xe9").expect("latin-1 accepts every byte");
    /// assert_eq!(text, "café");
    /// assert!(HeaderEncoding::Ascii.decode(b"caf\xe9").is_err());
    /// ```
    pub fn decode(self, bytes: &[u8]) -> Result<Cow<'_, str>, MalformedPayload> {
        let invalid = || MalformedPayload::InvalidHeaderEncoding {
            encoding: self.name(),
        };
        match self {
            Self::Utf8 => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| invalid()),
            Self::Ascii if bytes.is_ascii() => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| invalid()),
            Self::Ascii => Err(invalid()),
            Self::Latin1 if bytes.is_ascii() => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|_| invalid()),
            Self::Latin1 => Ok(Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())),
        }
    }

    /// Encode header text for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload::InvalidHeaderEncoding`] when `text` holds
    /// characters this encoding cannot represent.
    pub fn encode(self, text: &str) -> Result<Cow<'_, [u8]>, MalformedPayload> {
        let invalid = || MalformedPayload::InvalidHeaderEncoding {
            encoding: self.name(),
        };
        match self {
            Self::Utf8 => Ok(Cow::Borrowed(text.as_bytes())),
            _ if text.is_ascii() => Ok(Cow::Borrowed(text.as_bytes())),
            Self::Ascii => Err(invalid()),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| invalid()))
                .collect::<Result<Vec<u8>, _>>()
                .map(Cow::Owned),
        }
    }
}
