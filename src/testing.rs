//! Scripted collaborators for exercising the runtime without a chain,
//! a database or a billing service.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::SecretString;
use uuid::Uuid;

use crate::billing::{BillingPolicy, FundsService, TaskCharge};
use crate::chain::{
    Balance, ChainClient, ChainConnector, ChainRequest, Cost, Network, Submission, Token,
    TxState, Wei,
};
use crate::config::RuntimeConfig;
use crate::db::ProcessStore;
use crate::error::{BillingError, ChainError, ProfileError};
use crate::profile::{NetworkSettings, Profile, ProfileProvider, ProfileType};
use crate::task::TaskServices;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A call observed by [`ScriptedChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainCall {
    NetworkId,
    WalletAddress,
    Balance(Token),
    Submit(ChainRequest),
    Poll(String),
}

/// Chain client answering from a script and recording every call.
pub struct ScriptedChain {
    network: Network,
    address: String,
    balances: Mutex<HashMap<Token, Result<Wei, String>>>,
    cost: Cost,
    tx_id: String,
    approve_tx_id: Option<String>,
    submit_latency: Duration,
    submit_panic: Option<String>,
    polls: Mutex<VecDeque<TxState>>,
    calls: Mutex<Vec<ChainCall>>,
}

impl ScriptedChain {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            address: "0xwallet".to_string(),
            balances: Mutex::new(HashMap::new()),
            cost: Cost {
                gas_limit: 100_000,
                gas_price: 1_000_000_000,
            },
            tx_id: "0xprimary".to_string(),
            approve_tx_id: None,
            submit_latency: Duration::ZERO,
            submit_panic: None,
            polls: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_balance(self, token: Token, wei: Wei) -> Self {
        lock(&self.balances).insert(token, Ok(wei));
        self
    }

    pub fn with_failing_balance(self, token: Token, reason: &str) -> Self {
        lock(&self.balances).insert(token, Err(reason.to_string()));
        self
    }

    pub fn with_cost(mut self, cost: Cost) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_tx_ids(mut self, tx_id: &str, approve_tx_id: Option<&str>) -> Self {
        self.tx_id = tx_id.to_string();
        self.approve_tx_id = approve_tx_id.map(str::to_string);
        self
    }

    /// Delay every submission, to let cancellation or deadlines win.
    pub fn with_submit_latency(mut self, latency: Duration) -> Self {
        self.submit_latency = latency;
        self
    }

    /// Panic inside `submit` with `message`.
    pub fn panicking_on_submit(mut self, message: &str) -> Self {
        self.submit_panic = Some(message.to_string());
        self
    }

    /// States returned by successive polls. Once exhausted, polls report
    /// `Pending`.
    pub fn with_polls(self, states: impl IntoIterator<Item = TxState>) -> Self {
        self.queue_polls(states);
        self
    }

    /// Append poll states on a shared client.
    pub fn queue_polls(&self, states: impl IntoIterator<Item = TxState>) {
        lock(&self.polls).extend(states);
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        lock(&self.calls).clone()
    }

    pub fn submissions(&self) -> Vec<ChainRequest> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                ChainCall::Submit(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn balance_queries(&self) -> Vec<Token> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                ChainCall::Balance(token) => Some(*token),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ChainCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    fn network(&self) -> Network {
        self.network
    }

    async fn network_id(&self) -> Result<u64, ChainError> {
        self.record(ChainCall::NetworkId);
        Ok(324)
    }

    async fn wallet_address(&self) -> Result<String, ChainError> {
        self.record(ChainCall::WalletAddress);
        Ok(self.address.clone())
    }

    async fn balance(&self, _address: &str, token: Token) -> Result<Balance, ChainError> {
        self.record(ChainCall::Balance(token));
        let scripted = lock(&self.balances).get(&token).cloned();
        match scripted {
            Some(Ok(wei)) => Ok(Balance {
                wei,
                human: i128::try_from(wei)
                    .ok()
                    .and_then(|v| Decimal::try_from_i128_with_scale(v, 18).ok())
                    .unwrap_or(Decimal::MAX),
            }),
            Some(Err(reason)) => Err(ChainError::Rpc {
                network: self.network,
                reason,
            }),
            None => Ok(Balance {
                wei: 0,
                human: Decimal::ZERO,
            }),
        }
    }

    async fn submit(&self, request: &ChainRequest) -> Result<Submission, ChainError> {
        self.record(ChainCall::Submit(request.clone()));
        if let Some(message) = &self.submit_panic {
            panic!("{message}");
        }
        if !self.submit_latency.is_zero() {
            tokio::time::sleep(self.submit_latency).await;
        }
        if request.estimate_only {
            return Ok(Submission {
                tx_id: String::new(),
                approve_tx_id: None,
                cost: self.cost,
            });
        }
        Ok(Submission {
            tx_id: self.tx_id.clone(),
            approve_tx_id: self.approve_tx_id.clone(),
            cost: self.cost,
        })
    }

    async fn poll_transaction(&self, tx_id: &str) -> Result<TxState, ChainError> {
        self.record(ChainCall::Poll(tx_id.to_string()));
        Ok(lock(&self.polls).pop_front().unwrap_or(TxState::Pending))
    }
}

/// Connector handing out pre-built [`ScriptedChain`]s by network.
#[derive(Default)]
pub struct StaticConnector {
    clients: HashMap<Network, Arc<ScriptedChain>>,
}

impl StaticConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, client: Arc<ScriptedChain>) -> Self {
        self.clients.insert(client.network(), client);
        self
    }
}

#[async_trait]
impl ChainConnector for StaticConnector {
    async fn connect(
        &self,
        _profile: &Profile,
        _settings: &NetworkSettings,
        network: Network,
    ) -> Result<Arc<dyn ChainClient>, ChainError> {
        match self.clients.get(&network) {
            Some(client) => Ok(client.clone()),
            None => Err(ChainError::Unsupported {
                network,
                operation: "connect".to_string(),
            }),
        }
    }
}

/// An EVM profile with a throwaway key.
pub fn sample_profile(user_id: &str) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        label: "test wallet".to_string(),
        kind: ProfileType::Evm,
        sub_type: None,
        private_key: SecretString::from("0x0123456789abcdef".to_string()),
        proxy: None,
        user_agent: "chainflow-test".to_string(),
    }
}

/// Profiles and settings from fixed tables.
#[derive(Default)]
pub struct StaticProfiles {
    profiles: HashMap<Uuid, Profile>,
    settings: HashMap<(String, Network), NetworkSettings>,
}

impl StaticProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profiles.insert(profile.id, profile);
        self
    }

    pub fn with_settings(mut self, user_id: &str, settings: NetworkSettings) -> Self {
        self.settings
            .insert((user_id.to_string(), settings.network), settings);
        self
    }
}

#[async_trait]
impl ProfileProvider for StaticProfiles {
    async fn profile(&self, id: Uuid) -> Result<Profile, ProfileError> {
        self.profiles
            .get(&id)
            .cloned()
            .ok_or(ProfileError::NotFound { id })
    }

    async fn network_settings(
        &self,
        user_id: &str,
        network: Network,
    ) -> Result<NetworkSettings, ProfileError> {
        self.settings
            .get(&(user_id.to_string(), network))
            .cloned()
            .ok_or_else(|| ProfileError::NetworkSettingsMissing {
                user_id: user_id.to_string(),
                network,
            })
    }
}

/// Funds service with a fixed balance that records every charge.
pub struct RecordingFunds {
    funds: Mutex<Decimal>,
    outage: Mutex<Option<String>>,
    queries: Mutex<Vec<String>>,
    charges: Mutex<Vec<TaskCharge>>,
}

impl RecordingFunds {
    pub fn new(funds: Decimal) -> Self {
        Self {
            funds: Mutex::new(funds),
            outage: Mutex::new(None),
            queries: Mutex::new(Vec::new()),
            charges: Mutex::new(Vec::new()),
        }
    }

    pub fn set_funds(&self, funds: Decimal) {
        *lock(&self.funds) = funds;
    }

    /// Fail every later `get_funds` call with `reason`.
    pub fn set_unavailable(&self, reason: &str) {
        *lock(&self.outage) = Some(reason.to_string());
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    pub fn charges(&self) -> Vec<TaskCharge> {
        lock(&self.charges).clone()
    }
}

#[async_trait]
impl FundsService for RecordingFunds {
    async fn get_funds(&self, login: &str) -> Result<Decimal, BillingError> {
        lock(&self.queries).push(login.to_string());
        if let Some(reason) = lock(&self.outage).clone() {
            return Err(BillingError::Unavailable(reason));
        }
        Ok(*lock(&self.funds))
    }

    async fn task_completed(&self, charge: &TaskCharge) -> Result<(), BillingError> {
        lock(&self.charges).push(charge.clone());
        Ok(())
    }
}

/// Assemble [`TaskServices`] from the given collaborators.
pub fn services(
    store: Arc<dyn ProcessStore>,
    profiles: Arc<dyn ProfileProvider>,
    connector: Arc<dyn ChainConnector>,
    funds: Arc<dyn FundsService>,
    config: RuntimeConfig,
) -> Arc<TaskServices> {
    Arc::new(TaskServices {
        store,
        profiles,
        connector,
        funds,
        billing: BillingPolicy::new(config.env),
        config,
    })
}
