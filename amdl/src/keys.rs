//! Content key acquisition.
//!
//! The licensing handshake is delegated to a license gateway reachable over
//! HTTP. It receives the track and its protection locator and answers with
//! the content key; this crate never talks to a key system directly.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use catalog_parser::{ProtectionLocator, TrackId};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::KeyAcquisitionError;

/// Slot index under which legacy content keys are registered.
pub const LEGACY_KEY_SLOT: u32 = 1;

const KEY_LEN: usize = 16;

/// Where the decrypter should apply a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySlot {
    /// Key id (hex) announced by the license.
    KeyId(String),
    /// Fixed track index.
    Index(u32),
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySlot::KeyId(kid) => f.write_str(kid),
            KeySlot::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A content key. Never persisted, and its `Debug` output hides the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey {
    key: String,
    slot: KeySlot,
}

impl DecryptionKey {
    /// Validate a hex key (16 bytes) and normalize it to lowercase.
    pub fn new(key_hex: &str, slot: KeySlot) -> Result<Self, KeyAcquisitionError> {
        let key = normalize_hex(key_hex, "key")?;
        let slot = match slot {
            KeySlot::KeyId(kid) => KeySlot::KeyId(normalize_hex(&kid, "kid")?),
            index => index,
        };
        Ok(Self { key, slot })
    }

    pub fn slot(&self) -> &KeySlot {
        &self.slot
    }

    /// `<slot>:<key>` as the decrypter expects it.
    pub fn decrypter_spec(&self) -> String {
        format!("{}:{}", self.slot, self.key)
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("slot", &self.slot)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn normalize_hex(value: &str, what: &str) -> Result<String, KeyAcquisitionError> {
    let value = value.trim().trim_start_matches("0x").replace('-', "");
    let bytes = hex::decode(&value)
        .map_err(|e| KeyAcquisitionError::Malformed(format!("{what} is not hex: {e}")))?;
    if bytes.len() != KEY_LEN {
        return Err(KeyAcquisitionError::Malformed(format!(
            "{what} must be {KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(hex::encode(bytes))
}

/// Obtains content keys for protected tracks.
///
/// Implementations must be idempotent per `(track, locator)` and must not
/// retry internally; a failure is reported once.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn acquire_key(
        &self,
        track: &TrackId,
        locator: &ProtectionLocator,
    ) -> Result<DecryptionKey, KeyAcquisitionError>;
}

#[derive(Debug, Serialize)]
struct LicenseRequest<'a> {
    track_id: &'a str,
    locator: &'a ProtectionLocator,
    key_system: &'static str,
}

#[derive(Debug, Deserialize)]
struct LicenseResponse {
    key: String,
    #[serde(default)]
    kid: Option<String>,
}

/// [`KeyProvider`] backed by an HTTP license gateway.
#[derive(Debug, Clone)]
pub struct LicenseClient {
    client: Client,
    endpoint: Option<String>,
    token: Option<String>,
    timeout: Option<Duration>,
}

impl LicenseClient {
    pub fn new(client: Client, endpoint: Option<String>, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.filter(|e| !e.trim().is_empty()),
            token: token.filter(|t| !t.is_empty()),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Key system implied by a locator kind.
fn key_system(locator: &ProtectionLocator) -> &'static str {
    match locator {
        ProtectionLocator::Header(_) => "widevine",
        ProtectionLocator::KeyUri(_) => "fairplay",
    }
}

fn validate_locator(locator: &ProtectionLocator) -> Result<(), KeyAcquisitionError> {
    match locator {
        ProtectionLocator::Header(header) if header.trim().is_empty() => Err(
            KeyAcquisitionError::InvalidLocator("empty key-system header".to_string()),
        ),
        ProtectionLocator::KeyUri(uri) if !uri.contains("://") && !uri.starts_with("data:") => Err(
            KeyAcquisitionError::InvalidLocator(format!("not a key uri: {uri}")),
        ),
        _ => Ok(()),
    }
}

#[async_trait]
impl KeyProvider for LicenseClient {
    #[instrument(skip(self, locator), fields(key_system = key_system(locator)))]
    async fn acquire_key(
        &self,
        track: &TrackId,
        locator: &ProtectionLocator,
    ) -> Result<DecryptionKey, KeyAcquisitionError> {
        validate_locator(locator)?;
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(KeyAcquisitionError::NotConfigured)?;

        let mut request = self.client.post(endpoint).json(&LicenseRequest {
            track_id: track.as_str(),
            locator,
            key_system: key_system(locator),
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let message = message.lines().next().unwrap_or_default().trim().to_string();
            return Err(KeyAcquisitionError::Denied {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        let license: LicenseResponse = serde_json::from_slice(&body)
            .map_err(|e| KeyAcquisitionError::Malformed(e.to_string()))?;

        let slot = match locator {
            ProtectionLocator::KeyUri(_) => KeySlot::Index(LEGACY_KEY_SLOT),
            ProtectionLocator::Header(_) => KeySlot::KeyId(license.kid.ok_or_else(|| {
                KeyAcquisitionError::Malformed("license is missing the key id".to_string())
            })?),
        };
        let key = DecryptionKey::new(&license.key, slot)?;
        debug!(slot = %key.slot(), "Content key acquired");
        Ok(key)
    }
}
