//! Wallet profiles and per-network settings, owned by an external service.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::{Network, Wei};
use crate::error::ProfileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    Evm,
    StarkNet,
}

/// A user-owned wallet. Key material never leaves the [`SecretString`].
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: String,
    pub label: String,
    pub kind: ProfileType,
    /// Account flavour for networks with several (StarkNet wallets).
    pub sub_type: Option<String>,
    pub private_key: SecretString,
    pub proxy: Option<String>,
    pub user_agent: String,
}

/// Where a user's network settings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsSource {
    /// Service defaults.
    Default,
    /// User-edited settings.
    User,
}

impl SettingsSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for SettingsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub network: Network,
    pub source: SettingsSource,
    pub rpc_endpoint: String,
    /// Gas limit multiplier applied to estimates when `source` is `User`.
    #[serde(default)]
    pub gas_multiplier: Option<Decimal>,
    /// Refuse submissions whose worst-case fee exceeds this many wei.
    #[serde(default, with = "optional_wei")]
    pub max_fee_wei: Option<Wei>,
}

impl NetworkSettings {
    pub fn defaults(network: Network, rpc_endpoint: impl Into<String>) -> Self {
        Self {
            network,
            source: SettingsSource::Default,
            rpc_endpoint: rpc_endpoint.into(),
            gas_multiplier: None,
            max_fee_wei: None,
        }
    }
}

mod optional_wei {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    use crate::chain::Wei;

    pub fn serialize<S: Serializer>(value: &Option<Wei>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Wei>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| {
                raw.trim()
                    .parse::<Wei>()
                    .map_err(|e| D::Error::custom(format!("invalid wei amount '{raw}': {e}")))
            })
            .transpose()
    }
}

/// Read access to profiles and their network settings.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn profile(&self, id: Uuid) -> Result<Profile, ProfileError>;

    async fn network_settings(
        &self,
        user_id: &str,
        network: Network,
    ) -> Result<NetworkSettings, ProfileError>;
}
