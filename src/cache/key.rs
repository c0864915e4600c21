//! Cache key derivation.
//!
//! The default key is `"{basename}_{width}x{height}"`. It is cheap and stable, but two
//! different images that share a file name and resolution collide, and the same pixels
//! under another name miss. [`pixel_digest`] provides the stronger content-addressed
//! variant.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ExtractError, ExtractResult};

/// Hex characters of the pixel digest folded into content keys.
const PIXEL_DIGEST_LEN: usize = 16;

/// Deterministic identifier of one cacheable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// `"{basename}_{width}x{height}"`.
    ///
    /// Only the final path component counts, so the same file reached through different
    /// directories maps to one key.
    ///
    /// ```rust
    /// use std::path::Path;
    /// use ballistic_features::cache::CacheKey;
    ///
    /// let key = CacheKey::for_image(Path::new("/uploads/2024/case_17.png"), 800, 600);
    /// assert_eq!(key.as_str(), "case_17.png_800x600");
    /// ```
    pub fn for_image(identity: &Path, width: u32, height: u32) -> Self {
        Self(format!("{}_{}x{}", basename(identity), width, height))
    }

    /// `"{prefix}_{sha256(params)}"`, where `params` is hashed through its JSON encoding.
    ///
    /// Pure in its inputs: equal parameters always give an equal key.
    pub fn from_params<P: Serialize + ?Sized>(prefix: &str, params: &P) -> ExtractResult<Self> {
        let encoded = serde_json::to_vec(params).map_err(|e| {
            ExtractError::from(e).with_operation("encode cache key parameters")
        })?;
        Ok(Self(format!("{}_{}", prefix, sha256_hex(&encoded))))
    }

    /// Appends `_{part}`.
    pub fn with_part(mut self, part: impl fmt::Display) -> Self {
        use std::fmt::Write;
        let _ = write!(self.0, "_{part}");
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of this key's disk entry: hex SHA-256 of the key plus `.cache`.
    pub fn file_name(&self) -> String {
        format!("{}.cache", sha256_hex(self.0.as_bytes()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Short hex digest of raw pixel bytes.
pub fn pixel_digest(bytes: &[u8]) -> String {
    let mut digest = sha256_hex(bytes);
    digest.truncate(PIXEL_DIGEST_LEN);
    digest
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn basename(identity: &Path) -> String {
    match identity.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => identity.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basename_and_dimensions() {
        let a = CacheKey::for_image(Path::new("a/b/shell.jpg"), 1024, 768);
        let b = CacheKey::for_image(Path::new("shell.jpg"), 1024, 768);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "shell.jpg_1024x768");
    }

    #[test]
    fn test_distinct_names_distinct_keys() {
        let a = CacheKey::for_image(Path::new("left.png"), 800, 600);
        let b = CacheKey::for_image(Path::new("right.png"), 800, 600);
        assert_ne!(a, b);
        assert_ne!(a.file_name(), b.file_name());
    }

    #[test]
    fn test_distinct_dimensions_distinct_keys() {
        let a = CacheKey::for_image(Path::new("x.png"), 800, 600);
        let b = CacheKey::for_image(Path::new("x.png"), 600, 800);
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_params_is_pure() {
        let a = CacheKey::from_params("features", &("case.png", 800, 600, 1u32)).unwrap();
        let b = CacheKey::from_params("features", &("case.png", 800, 600, 1u32)).unwrap();
        let c = CacheKey::from_params("features", &("case.png", 800, 600, 2u32)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("features_"));
        assert_eq!(a.as_str().len(), "features_".len() + 64);
    }

    #[test]
    fn test_with_part() {
        let key = CacheKey::for_image(Path::new("x.png"), 2, 3)
            .with_part("o1")
            .with_part("t128");
        assert_eq!(key.as_str(), "x.png_2x3_o1_t128");
    }

    #[test]
    fn test_file_name_shape() {
        let name = CacheKey::new("x.png_2x3").file_name();
        assert!(name.ends_with(".cache"));
        assert_eq!(name.len(), 64 + ".cache".len());
        assert!(name.trim_end_matches(".cache").chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_pixel_digest() {
        assert_eq!(pixel_digest(b"abc").len(), 16);
        assert_ne!(pixel_digest(b"abc"), pixel_digest(b"abd"));
    }
}
