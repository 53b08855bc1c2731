//! Layered configuration: YAML file, then `XIBO_`-prefixed environment.
//!
//! Nested keys use a double underscore in the environment, e.g.
//! `XIBO_CREDENTIAL__CLIENT_SECRET` or `XIBO_CLIENT__PAGE_SIZE`. Credential
//! keys are emitted in the camelCase the credential form uses, so a file value
//! and its environment override land on the same key.

use std::path::Path;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::Deserialize;
use xibo_core::{ClientConfig, Credential};

pub const ENV_PREFIX: &str = "XIBO_";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub credential: Credential,
    #[serde(default)]
    pub client: ClientConfig,
}

impl CliConfig {
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .split("__")
                    .map(|key| env_key(key.as_str()).into())
                    .lowercase(false),
            )
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: Self = Self::figment(path)
            .extract()
            .with_context(|| format!("loading configuration from {}", path.display()))?;
        config.client.validate()?;
        Ok(config)
    }
}

/// `CREDENTIAL.CLIENT_SECRET` -> `credential.clientSecret`; other sections
/// keep snake_case.
fn env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    match key.split_once('.') {
        Some(("credential", field)) => format!("credential.{}", camel_case(field)),
        _ => key,
    }
}

fn camel_case(field: &str) -> String {
    let mut parts = field.split('_').filter(|p| !p.is_empty());
    let mut out = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::time::Duration;

    #[test]
    fn loads_yaml_with_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "xibo.yaml",
                r#"
credential:
  url: https://cms.example.com/
  clientId: node-app
  clientSecret: s3cret
"#,
            )?;
            let config = CliConfig::load(Path::new("xibo.yaml")).map_err(|e| e.to_string())?;
            assert_eq!(config.credential.base_url(), "https://cms.example.com");
            assert_eq!(config.credential.client_id(), "node-app");
            assert_eq!(config.client, ClientConfig::default());
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "xibo.yaml",
                r#"
credential:
  url: https://cms.example.com
  clientId: node-app
  clientSecret: from-file
client:
  token_ttl: 10m
"#,
            )?;
            jail.set_env("XIBO_CREDENTIAL__CLIENT_SECRET", "from-env");
            jail.set_env("XIBO_CLIENT__PAGE_SIZE", "25");

            let config = CliConfig::load(Path::new("xibo.yaml")).map_err(|e| e.to_string())?;
            assert_eq!(config.credential.client_secret().expose(), "from-env");
            assert_eq!(config.client.page_size, 25);
            assert_eq!(config.client.token_ttl, Duration::from_secs(600));
            Ok(())
        });
    }

    #[test]
    fn env_keys_match_credential_form() {
        assert_eq!(env_key("CREDENTIAL.CLIENT_SECRET"), "credential.clientSecret");
        assert_eq!(env_key("CREDENTIAL.CLIENT_ID"), "credential.clientId");
        assert_eq!(env_key("CREDENTIAL.URL"), "credential.url");
        assert_eq!(env_key("CLIENT.PAGE_SIZE"), "client.page_size");
        assert_eq!(env_key("CLIENT.TOKEN_TTL"), "client.token_ttl");
    }

    #[test]
    fn environment_overrides_every_credential_field() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "xibo.yaml",
                r#"
credential:
  url: https://file.example.com
  clientId: file-app
  clientSecret: file-secret
"#,
            )?;
            jail.set_env("XIBO_CREDENTIAL__URL", "https://env.example.com/");
            jail.set_env("XIBO_CREDENTIAL__CLIENT_ID", "env-app");
            jail.set_env("XIBO_CREDENTIAL__CLIENT_SECRET", "env-secret");

            let config = CliConfig::load(Path::new("xibo.yaml")).map_err(|e| e.to_string())?;
            assert_eq!(config.credential.base_url(), "https://env.example.com");
            assert_eq!(config.credential.client_id(), "env-app");
            assert_eq!(config.credential.client_secret().expose(), "env-secret");
            Ok(())
        });
    }

    #[test]
    fn credential_from_environment_only() {
        Jail::expect_with(|jail| {
            jail.set_env("XIBO_CREDENTIAL__URL", "http://localhost:3000");
            jail.set_env("XIBO_CREDENTIAL__CLIENT_ID", "env-app");
            jail.set_env("XIBO_CREDENTIAL__CLIENT_SECRET", "env-secret");

            let config = CliConfig::load(Path::new("missing.yaml")).map_err(|e| e.to_string())?;
            assert_eq!(config.credential.base_url(), "http://localhost:3000");
            assert_eq!(config.credential.client_id(), "env-app");
            Ok(())
        });
    }

    #[test]
    fn missing_credential_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file("xibo.yaml", "client:\n  page_size: 10\n")?;
            assert!(CliConfig::load(Path::new("xibo.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn invalid_client_settings_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "xibo.yaml",
                r#"
credential:
  url: https://cms.example.com
  clientId: a
  clientSecret: b
client:
  page_size: 0
"#,
            )?;
            let err = CliConfig::load(Path::new("xibo.yaml")).unwrap_err();
            assert!(err.to_string().contains("page_size"), "{err}");
            Ok(())
        });
    }
}
