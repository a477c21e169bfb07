// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// API key handling for the agent.

use std::fmt;
use std::path::{Path, PathBuf};

use paginator_core::error::{PaginatorError, Result};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{info, instrument};

/// File the generated key is saved to, inside the output directory.
pub const API_KEY_FILE: &str = ".api-key";

/// Random bytes in a generated key (hex-encoded to twice as many characters).
const GENERATED_KEY_BYTES: usize = 32;

/// Shared secret clients present in `X-API-Key` or the WebSocket
/// `authenticate` message.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// 32 bytes from the system CSPRNG, hex-encoded.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; GENERATED_KEY_BYTES];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| PaginatorError::Server("system random source unavailable".into()))?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Use `configured` when it is non-blank; otherwise generate a key and
    /// save it to `<output_dir>/.api-key`.
    ///
    /// Returns the key and, when one was generated, where it was saved.
    #[instrument(skip(configured), fields(output_dir = %output_dir.display()))]
    pub fn resolve(configured: Option<&str>, output_dir: &Path) -> Result<(Self, Option<PathBuf>)> {
        if let Some(key) = configured.map(str::trim).filter(|k| !k.is_empty()) {
            return Ok((Self::new(key), None));
        }

        let key = Self::generate()?;
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(API_KEY_FILE);
        std::fs::write(&path, key.as_str())?;
        info!(path = %path.display(), "Generated API key saved");
        Ok((key, Some(path)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a presented key.
    pub fn verify(&self, candidate: Option<&str>) -> bool {
        let Some(candidate) = candidate else {
            return false;
        };
        #[allow(deprecated)]
        ring::constant_time::verify_slices_are_equal(self.0.as_bytes(), candidate.as_bytes())
            .is_ok()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_64_hex_chars_and_distinct() {
        let a = ApiKey::generate().expect("key");
        let b = ApiKey::generate().expect("key");
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn verify_requires_exact_match() {
        let key = ApiKey::new("secret-key");
        assert!(key.verify(Some("secret-key")));
        assert!(!key.verify(Some("secret-kez")));
        assert!(!key.verify(Some("secret")));
        assert!(!key.verify(Some("")));
        assert!(!key.verify(None));
    }

    #[test]
    fn configured_key_wins_and_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (key, saved) = ApiKey::resolve(Some(" from-env "), dir.path()).expect("resolve");
        assert_eq!(key.as_str(), "from-env");
        assert!(saved.is_none());
        assert!(!dir.path().join(API_KEY_FILE).exists());
    }

    #[test]
    fn missing_key_is_generated_and_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (key, saved) = ApiKey::resolve(None, &dir.path().join("out")).expect("resolve");
        let saved = saved.expect("saved path");
        assert_eq!(std::fs::read_to_string(saved).expect("read"), key.as_str());
    }

    #[test]
    fn debug_output_hides_the_key() {
        let key = ApiKey::new("hunter2");
        assert!(!format!("{key:?}").contains("hunter2"));
    }
}
