use crate::error::CoreError;
use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Maximum accepted length of an origin URL, matching the `origin_url` column.
pub const MAX_ORIGIN_LENGTH: usize = 512;

/// A persisted short code to origin URL mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub code: ShortCode,
    pub origin: String,
    pub expire_at: Timestamp,
}

impl UrlRecord {
    /// Builds a record after validating the origin.
    pub fn new(
        code: ShortCode,
        origin: impl Into<String>,
        expire_at: Timestamp,
    ) -> Result<Self, CoreError> {
        let origin = origin.into();
        validate_origin(&origin)?;
        Ok(Self {
            code,
            origin,
            expire_at,
        })
    }

    /// A record is expired once `now` reaches its expiry instant.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expire_at <= now
    }
}

/// Checks that `origin` is a non-empty absolute http(s) URL.
pub fn validate_origin(origin: &str) -> Result<(), CoreError> {
    if origin.is_empty() {
        return Err(CoreError::InvalidOrigin(
            "origin cannot be empty".to_string(),
        ));
    }

    if origin.len() > MAX_ORIGIN_LENGTH {
        return Err(CoreError::InvalidOrigin(format!(
            "origin exceeds {} bytes",
            MAX_ORIGIN_LENGTH
        )));
    }

    if !origin.is_ascii() || origin.chars().any(|c| c.is_ascii_whitespace()) {
        return Err(CoreError::InvalidOrigin(format!(
            "origin must be printable ascii: {}",
            origin
        )));
    }

    let Some((scheme, rest)) = origin.split_once("://") else {
        return Err(CoreError::InvalidOrigin(format!(
            "origin must have a valid scheme and host: {}",
            origin
        )));
    };
    if scheme.is_empty() || rest.is_empty() || rest.starts_with('/') {
        return Err(CoreError::InvalidOrigin(format!(
            "origin must have a valid scheme and host: {}",
            origin
        )));
    }

    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(CoreError::InvalidOrigin(format!(
            "origin scheme must be http or https: {}",
            scheme
        )));
    }

    Ok(())
}
