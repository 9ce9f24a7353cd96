//! Known identities and subscription tokens.

use std::collections::HashSet;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::config::ConfigError;
use crate::message::{Announcement, Message};

type HmacSha256 = Hmac<Sha256>;

/// A persona the client can act as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub auth_token: String,
}

impl Identity {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Handshake payload announcing this identity with its current inbox.
    pub fn announcement<'a>(&'a self, messages: &'a [Arc<Message>]) -> Announcement<'a> {
        Announcement {
            name: &self.display_name,
            username: &self.id,
            token: &self.auth_token,
            messages,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to initialize token signer: {0}")]
    Signer(String),
}

/// Derives the subscription token the hub expects for a username.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, username: &str) -> Result<String, TokenError>;
}

/// hex(HMAC-SHA256(secret, username)), matching the hub's validator.
#[derive(Clone)]
pub struct HmacSha256Tokenizer {
    secret: Vec<u8>,
}

impl HmacSha256Tokenizer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }
}

impl Tokenizer for HmacSha256Tokenizer {
    fn tokenize(&self, username: &str) -> Result<String, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|error| TokenError::Signer(error.to_string()))?;
        mac.update(username.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Fixed, ordered set of identities available for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCatalog {
    identities: Vec<Identity>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "identity")]
    identities: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    display_name: Option<String>,
    token: Option<String>,
}

impl IdentityCatalog {
    /// Build a catalog, rejecting empty or duplicate ids.
    pub fn new(identities: Vec<Identity>) -> Result<Self, ConfigError> {
        if identities.is_empty() {
            return Err(ConfigError::InvalidCatalog(
                "catalog has no identities".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for identity in &identities {
            if identity.id.trim().is_empty() {
                return Err(ConfigError::InvalidCatalog(
                    "identity id must not be empty".to_string(),
                ));
            }
            if !seen.insert(identity.id.as_str()) {
                return Err(ConfigError::InvalidCatalog(format!(
                    "duplicate identity id: {}",
                    identity.id
                )));
            }
        }
        Ok(Self { identities })
    }

    /// The demo personas shipped with the hub.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            identities: vec![
                Identity::new(
                    "mario",
                    "Mario",
                    "31a3d1333ddc2e93075593a131158c9ac8ebebe1ea1bc45fdd17a884c2ad5853",
                ),
                Identity::new(
                    "luigi",
                    "Luigi",
                    "a6ca78a7420c3354315f18f662ef496b4df04e5b7bd41095794ba3653cf55522",
                ),
                Identity::new(
                    "yoshi",
                    "Yoshi",
                    "d1a0cf5c56522fc36ffecc5611b6751a20b5a09eee35e86bfb05a2e7d0398dc4",
                ),
            ],
        }
    }

    /// Parse a TOML catalog of `[[identity]]` tables.
    ///
    /// Entries without a `token` get one from `tokenizer`; without a tokenizer
    /// such entries are rejected.
    pub fn from_toml_str(
        text: &str,
        tokenizer: Option<&dyn Tokenizer>,
    ) -> Result<Self, ConfigError> {
        let file: CatalogFile = toml::from_str(text)?;
        let mut identities = Vec::with_capacity(file.identities.len());
        for entry in file.identities {
            let id = entry.id.trim().to_string();
            let token = match (entry.token, tokenizer) {
                (Some(token), _) => token,
                (None, Some(tokenizer)) => tokenizer.tokenize(&id)?,
                (None, None) => {
                    return Err(ConfigError::InvalidCatalog(format!(
                        "identity {id} has no token and HUB_TOKEN_SECRET is unset"
                    )));
                }
            };
            let display_name = entry.display_name.unwrap_or_else(|| id.clone());
            identities.push(Identity::new(id, display_name, token));
        }
        Self::new(identities)
    }

    pub fn get(&self, id: &str) -> Option<&Identity> {
        self.identities.iter().find(|identity| identity.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.identities.iter().map(|identity| identity.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
