#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chainflow::billing::BillingUser;
use chainflow::chain::Network;
use chainflow::config::{RuntimeConfig, RuntimeEnv};
use chainflow::db::MemoryStore;
use chainflow::profile::NetworkSettings;
use chainflow::task::{ProcessTask, Task, TaskRegistry, TaskRunner};
use chainflow::testing::{
    RecordingFunds, ScriptedChain, StaticConnector, StaticProfiles, sample_profile, services,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

pub const USER_ID: &str = "user-1";

pub fn fast_config(env: RuntimeEnv, timeout: Duration) -> RuntimeConfig {
    RuntimeConfig {
        env,
        task_timeout: timeout,
        starknet_task_timeout: timeout,
        tx_poll_interval: Duration::from_millis(10),
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chain: Arc<ScriptedChain>,
    pub funds: Arc<RecordingFunds>,
    pub runner: TaskRunner,
    pub profile_id: Uuid,
    pub user: BillingUser,
}

impl Harness {
    pub fn new(chain: ScriptedChain) -> Self {
        Self::build(
            chain,
            fast_config(RuntimeEnv::Prod, Duration::from_secs(2)),
            TaskRegistry::standard(),
        )
    }

    pub fn with_timeout(chain: ScriptedChain, timeout: Duration) -> Self {
        Self::build(
            chain,
            fast_config(RuntimeEnv::Prod, timeout),
            TaskRegistry::standard(),
        )
    }

    pub fn build(chain: ScriptedChain, config: RuntimeConfig, registry: TaskRegistry) -> Self {
        let chain = Arc::new(chain);
        let profile = sample_profile(USER_ID);
        let profile_id = profile.id;
        let profiles = StaticProfiles::new()
            .with_profile(profile)
            .with_settings(USER_ID, NetworkSettings::defaults(Network::ZksyncEra, "http://rpc"))
            .with_settings(USER_ID, NetworkSettings::defaults(Network::Arbitrum, "http://rpc"));
        let connector = StaticConnector::new().with_client(chain.clone());
        let store = Arc::new(MemoryStore::new());
        let funds = Arc::new(RecordingFunds::new(dec!(10)));

        let services = services(
            store.clone(),
            Arc::new(profiles),
            Arc::new(connector),
            funds.clone(),
            config,
        );
        let runner = TaskRunner::new(Arc::new(registry), services);

        Self {
            store,
            chain,
            funds,
            runner,
            profile_id,
            user: BillingUser {
                id: USER_ID.to_string(),
                login: "alice".to_string(),
            },
        }
    }

    /// Create and store a fresh `Ready` task.
    pub async fn seed(&self, task: Task) -> ProcessTask {
        let task = ProcessTask::new(Uuid::new_v4(), self.profile_id, USER_ID, task)
            .expect("process task");
        self.store.insert(task.clone()).await;
        task
    }
}
