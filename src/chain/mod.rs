//! Chain client seam.
//!
//! Per-network RPC implementations live outside this crate. The runtime only
//! sees the [`ChainClient`] capability set and the [`ChainConnector`] that
//! builds a client for a profile on a given network.

mod network;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::profile::{NetworkSettings, Profile};
use crate::task::TaskKind;

pub use self::network::{Network, Token, Wei, wei_string};

/// Live balance of one token for one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub wei: Wei,
    /// Amount scaled by the token's decimals, for display only.
    pub human: Decimal,
}

/// Raw fee figures reported by a dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cost {
    pub gas_limit: u64,
    #[serde(with = "wei_string")]
    pub gas_price: Wei,
}

/// Concrete fee parameters for a real submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPlan {
    pub gas_limit: u64,
    #[serde(with = "wei_string")]
    pub gas_price: Wei,
}

impl GasPlan {
    /// Upper bound on what the submission can spend on fees.
    pub fn max_fee(&self) -> Wei {
        Wei::from(self.gas_limit).saturating_mul(self.gas_price)
    }
}

/// What a submission does on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Swap {
        kind: TaskKind,
        to_token: Token,
    },
    Bridge {
        kind: TaskKind,
        to_network: Network,
        to_token: Token,
    },
    Transfer {
        to_address: String,
    },
    /// Add to or remove from the `from_token`/`pair_token` pool.
    Liquidity {
        kind: TaskKind,
        pair_token: Token,
        add: bool,
    },
    MintAndBridgeNft {
        kind: TaskKind,
        to_network: Network,
    },
    DeployAccount,
    /// Pull funds from an exchange account into the bound wallet. Nothing is
    /// spent from the wallet beyond fees.
    ExchangeWithdraw {
        exchange: String,
        token: Token,
        amount: Wei,
    },
    /// Signed off-chain governance vote. The returned id is the vote receipt.
    Vote {
        space: String,
        proposal: String,
        choice: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRequest {
    pub operation: Operation,
    pub from_token: Token,
    pub amount: Wei,
    /// Simulate only; the client must not broadcast anything.
    pub estimate_only: bool,
    pub gas: Option<GasPlan>,
    /// Percent, e.g. `0.5` for half a percent.
    pub slippage: Option<Decimal>,
}

/// Result of [`ChainClient::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Empty for estimate-only calls.
    pub tx_id: String,
    pub approve_tx_id: Option<String>,
    pub cost: Cost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxState {
    Pending,
    Confirmed,
    Failed { reason: String },
}

/// Capabilities the runtime needs from a network client bound to one wallet.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn network(&self) -> Network;

    fn native_token(&self) -> Token {
        self.network().native_token()
    }

    async fn network_id(&self) -> Result<u64, ChainError>;

    /// Address derived from the bound profile's key material.
    async fn wallet_address(&self) -> Result<String, ChainError>;

    async fn balance(&self, address: &str, token: Token) -> Result<Balance, ChainError>;

    async fn submit(&self, request: &ChainRequest) -> Result<Submission, ChainError>;

    async fn poll_transaction(&self, tx_id: &str) -> Result<TxState, ChainError>;
}

/// Builds chain clients for a profile (proxy, user agent, RPC endpoint).
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(
        &self,
        profile: &Profile,
        settings: &NetworkSettings,
        network: Network,
    ) -> Result<Arc<dyn ChainClient>, ChainError>;
}
