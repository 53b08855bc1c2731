//! CMS application credential and its cache fingerprint.
//!
//! A credential is the `client_credentials` pair registered under
//! *My Account > Applications* in the CMS, plus the CMS base URL.

use std::fmt;

use serde::{Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Opaque wrapper around a secret string value.
///
/// `Debug` and `Display` both print `[REDACTED]`. The buffer is zeroed on
/// drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read access for building form bodies and headers. Do not log.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretString)
    }
}

/// Stable identity of a credential inside the token cache.
///
/// SHA-256 over the client id and the normalized base URL, so two CMS
/// instances or two applications never share a cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell entries apart in logs.
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

/// Credential form fields as the host supplies them.
#[derive(Deserialize)]
struct CredentialForm {
    #[serde(alias = "baseUrl", alias = "base_url")]
    url: String,
    #[serde(rename = "clientId", alias = "client_id", alias = "clientid")]
    client_id: String,
    #[serde(
        rename = "clientSecret",
        alias = "client_secret",
        alias = "clientsecret"
    )]
    client_secret: SecretString,
}

impl From<CredentialForm> for Credential {
    fn from(form: CredentialForm) -> Self {
        Credential::new(&form.url, form.client_id, form.client_secret)
    }
}

#[derive(Clone, Deserialize)]
#[serde(from = "CredentialForm")]
pub struct Credential {
    base_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl Credential {
    /// A trailing `/` on `base_url` is stripped.
    pub fn new(base_url: &str, client_id: impl Into<String>, client_secret: SecretString) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.client_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.base_url.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .finish()
    }
}
