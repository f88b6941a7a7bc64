//! crates/progress_core/src/data_uri.rs
//!
//! Inline binary payloads in the `data:<mime>;base64,<payload>` form used for
//! attachments, synthesized speech and generated images.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUriError {
    #[error("data URI must start with 'data:'")]
    MissingScheme,
    #[error("data URI must be base64 encoded")]
    NotBase64,
    #[error("data URI has no MIME type")]
    MissingMimeType,
    #[error("invalid base64 payload: {0}")]
    InvalidPayload(String),
    #[error("unsupported content type '{0}'")]
    UnsupportedType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Builds the URI string without decoding anything.
    pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
        format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
    }

    /// True for `image/*` payloads.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Parses `s` and rejects anything that is not an image.
    pub fn parse_image(s: &str) -> Result<Self, DataUriError> {
        let uri: DataUri = s.parse()?;
        if uri.is_image() {
            Ok(uri)
        } else {
            Err(DataUriError::UnsupportedType(uri.mime_type))
        }
    }
}

impl FromStr for DataUri {
    type Err = DataUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.trim().strip_prefix("data:").ok_or(DataUriError::MissingScheme)?;
        let (header, payload) = rest.split_once(',').ok_or(DataUriError::NotBase64)?;

        // Parameters such as `codecs=opus` may sit between the type and `base64`.
        let mut parts = header.split(';');
        let mime_type = parts.next().unwrap_or_default().trim();
        if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(DataUriError::NotBase64);
        }
        if mime_type.is_empty() {
            return Err(DataUriError::MissingMimeType);
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| DataUriError::InvalidPayload(e.to_string()))?;

        Ok(Self::new(mime_type, bytes))
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Self::encode(&self.mime_type, &self.bytes))
    }
}
