//! Tuning knobs for `XiboClient`.
//!
//! Durations are written in humantime form (`"50m"`, `"30s"`) when loaded
//! from a config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::XiboError;

/// CMS tokens live 60 minutes; reuse them for 50.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);
pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// How long a fetched token is served from the cache.
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,

    /// Items requested per page by the pagination walker.
    pub page_size: usize,

    /// Per-request timeout applied by the HTTP transport.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token_ttl: DEFAULT_TOKEN_TTL,
            page_size: DEFAULT_PAGE_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), XiboError> {
        if self.page_size == 0 {
            return Err(XiboError::Config("page_size must be at least 1".into()));
        }
        if self.token_ttl.is_zero() {
            return Err(XiboError::Config("token_ttl must be non-zero".into()));
        }
        if self.token_ttl > MAX_TOKEN_TTL {
            return Err(XiboError::Config("token_ttl must not exceed 24h".into()));
        }
        Ok(())
    }
}
