//! Environment-driven client configuration.

use std::{env, fs, path::PathBuf, sync::Arc, time::Duration};

use thiserror::Error;

use crate::identity::{HmacSha256Tokenizer, IdentityCatalog, TokenError, Tokenizer};

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1_500;
pub const DEFAULT_DIAGNOSTIC_LIMIT: usize = 200;

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub endpoint: String,
    pub api_base_url: String,
    pub connect_timeout: Option<Duration>,
    pub request_timeout: Duration,
    pub diagnostic_limit: usize,
    pub catalog: Arc<IdentityCatalog>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            connect_timeout: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            diagnostic_limit: DEFAULT_DIAGNOSTIC_LIMIT,
            catalog: Arc::new(IdentityCatalog::builtin()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid HUB_CONNECT_TIMEOUT_MS: {0}")]
    InvalidConnectTimeout(String),
    #[error("invalid HUB_REQUEST_TIMEOUT_MS: {0}")]
    InvalidRequestTimeout(String),
    #[error("invalid HUB_DIAGNOSTIC_LIMIT: {0}")]
    InvalidDiagnosticLimit(String),
    #[error("failed to read HUB_IDENTITIES_FILE {path}: {source}")]
    IdentitiesFileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse identity catalog: {0}")]
    CatalogParse(#[from] toml::de::Error),
    #[error("invalid identity catalog: {0}")]
    InvalidCatalog(String),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl HubConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let endpoint = read("HUB_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let api_base_url =
            read("HUB_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let connect_timeout_ms = read("HUB_CONNECT_TIMEOUT_MS")
            .unwrap_or_else(|| "0".to_string())
            .parse::<u64>()
            .map_err(|error| ConfigError::InvalidConnectTimeout(error.to_string()))?;
        let request_timeout_ms = read("HUB_REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|| DEFAULT_REQUEST_TIMEOUT_MS.to_string())
            .parse::<u64>()
            .map_err(|error| ConfigError::InvalidRequestTimeout(error.to_string()))?;
        if request_timeout_ms == 0 {
            return Err(ConfigError::InvalidRequestTimeout(
                "must be greater than zero".to_string(),
            ));
        }
        let diagnostic_limit = read("HUB_DIAGNOSTIC_LIMIT")
            .unwrap_or_else(|| DEFAULT_DIAGNOSTIC_LIMIT.to_string())
            .parse::<usize>()
            .map_err(|error| ConfigError::InvalidDiagnosticLimit(error.to_string()))?;

        let tokenizer = read("HUB_TOKEN_SECRET").map(HmacSha256Tokenizer::new);
        let catalog = match read("HUB_IDENTITIES_FILE") {
            Some(path) => {
                let path = PathBuf::from(path);
                let text = fs::read_to_string(&path)
                    .map_err(|source| ConfigError::IdentitiesFileRead { path, source })?;
                IdentityCatalog::from_toml_str(
                    &text,
                    tokenizer.as_ref().map(|tokenizer| tokenizer as &dyn Tokenizer),
                )?
            }
            None => IdentityCatalog::builtin(),
        };

        Ok(Self {
            endpoint,
            api_base_url,
            connect_timeout: (connect_timeout_ms > 0)
                .then(|| Duration::from_millis(connect_timeout_ms)),
            request_timeout: Duration::from_millis(request_timeout_ms),
            diagnostic_limit: diagnostic_limit.max(1),
            catalog: Arc::new(catalog),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |key: &str| values.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() -> anyhow::Result<()> {
        let config = HubConfig::from_lookup(lookup_from(&[]))?;
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.connect_timeout, None);
        assert_eq!(config.request_timeout, Duration::from_millis(1_500));
        assert_eq!(config.diagnostic_limit, 200);
        assert_eq!(config.catalog.len(), 3);
        Ok(())
    }

    #[test]
    fn blank_values_count_as_unset() -> anyhow::Result<()> {
        let config = HubConfig::from_lookup(lookup_from(&[
            ("HUB_ENDPOINT", "   "),
            ("HUB_CONNECT_TIMEOUT_MS", ""),
        ]))?;
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.connect_timeout, None);
        Ok(())
    }

    #[test]
    fn overrides_are_parsed() -> anyhow::Result<()> {
        let config = HubConfig::from_lookup(lookup_from(&[
            ("HUB_ENDPOINT", "wss://hub.example.com/ws"),
            ("HUB_API_BASE_URL", "https://hub.example.com/"),
            ("HUB_CONNECT_TIMEOUT_MS", "2500"),
            ("HUB_REQUEST_TIMEOUT_MS", "900"),
            ("HUB_DIAGNOSTIC_LIMIT", "0"),
        ]))?;
        assert_eq!(config.endpoint, "wss://hub.example.com/ws");
        assert_eq!(config.api_base_url, "https://hub.example.com/");
        assert_eq!(config.connect_timeout, Some(Duration::from_millis(2_500)));
        assert_eq!(config.request_timeout, Duration::from_millis(900));
        assert_eq!(config.diagnostic_limit, 1);
        Ok(())
    }

    #[test]
    fn invalid_numbers_name_the_variable() -> anyhow::Result<()> {
        let cases = [
            ("HUB_CONNECT_TIMEOUT_MS", "soon", "HUB_CONNECT_TIMEOUT_MS"),
            ("HUB_REQUEST_TIMEOUT_MS", "-1", "HUB_REQUEST_TIMEOUT_MS"),
            ("HUB_REQUEST_TIMEOUT_MS", "0", "HUB_REQUEST_TIMEOUT_MS"),
            ("HUB_DIAGNOSTIC_LIMIT", "lots", "HUB_DIAGNOSTIC_LIMIT"),
        ];
        for (key, value, fragment) in cases {
            let result = HubConfig::from_lookup(lookup_from(&[(key, value)]));
            match result {
                Err(error) => assert!(
                    error.to_string().contains(fragment),
                    "{key}={value}: expected '{fragment}' in '{error}'"
                ),
                Ok(_) => return Err(anyhow::anyhow!("{key}={value}: expected an error")),
            }
        }
        Ok(())
    }

    #[test]
    fn identities_file_uses_token_secret() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "[[identity]]\nid = \"luigi\"\ndisplay_name = \"Luigi\"")?;
        let path = file.path().to_string_lossy().to_string();

        let config = HubConfig::from_lookup(lookup_from(&[
            ("HUB_IDENTITIES_FILE", path.as_str()),
            ("HUB_TOKEN_SECRET", "secret-hash-code"),
        ]))?;
        let luigi = config
            .catalog
            .get("luigi")
            .ok_or_else(|| anyhow::anyhow!("luigi missing"))?;
        assert_eq!(
            luigi.auth_token,
            "a6ca78a7420c3354315f18f662ef496b4df04e5b7bd41095794ba3653cf55522"
        );
        assert_eq!(config.catalog.len(), 1);
        Ok(())
    }

    #[test]
    fn missing_identities_file_is_reported() {
        let result = HubConfig::from_lookup(lookup_from(&[(
            "HUB_IDENTITIES_FILE",
            "/nonexistent/hub-identities.toml",
        )]));
        assert!(matches!(
            result,
            Err(ConfigError::IdentitiesFileRead { .. })
        ));
    }
}
