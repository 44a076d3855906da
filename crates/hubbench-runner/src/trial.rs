use std::sync::Arc;
use std::time::Duration;

use hubbench_core::{TrialConfig, TrialResult, MEASURE_ROUNDS};
use hubbench_hub::{
    Hub, HubConfig, HubStore, InMemoryRouteTable, NullSessionLifecycle, RouteTable, DB_FILE_NAME,
    DEFAULT_PAGE_LIMIT,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::error::{StartupError, TrialError};
use crate::instrument::InstrumentedHub;
use crate::proxy::ProxyProcess;
use crate::seed::{seed_population, SESSION_TARGET_IP, SESSION_TARGET_PORT};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialOptions {
    #[serde(default)]
    pub with_proxy: bool,
    #[serde(default = "default_page_limit")]
    pub page_limit: u64,
}

fn default_page_limit() -> u64 {
    DEFAULT_PAGE_LIMIT
}

impl Default for TrialOptions {
    fn default() -> Self {
        Self {
            with_proxy: false,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialPhase {
    Init,
    Seeded,
    CollaboratorsInstalled,
    HubStarting,
    HubReady,
    Measuring,
    Done,
    Failed,
}

/// Runs exactly one configuration against a private backing store, a
/// fresh set of collaborators, and a fresh scheduler. Nothing survives
/// the trial scope; `Failed` is terminal and carries the originating
/// error to the caller.
pub struct TrialRunner {
    config: TrialConfig,
    options: TrialOptions,
    phase: TrialPhase,
}

impl TrialRunner {
    pub fn new(config: TrialConfig, options: TrialOptions) -> Self {
        Self {
            config,
            options,
            phase: TrialPhase::Init,
        }
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn run(&mut self) -> Result<TrialResult, TrialError> {
        match self.run_inner() {
            Ok(result) => {
                self.phase = TrialPhase::Done;
                Ok(result)
            }
            Err(err) => {
                self.phase = TrialPhase::Failed;
                info!(error = %err, kind = err.kind(), "trial failed");
                Err(err)
            }
        }
    }

    fn advance(&mut self, phase: TrialPhase) {
        debug!(from = ?self.phase, to = ?phase, "trial phase");
        self.phase = phase;
    }

    fn run_inner(&mut self) -> Result<TrialResult, TrialError> {
        self.config.validate()?;
        let scratch = tempfile::tempdir().map_err(StartupError::Scratch)?;
        let db_path = scratch.path().join(DB_FILE_NAME);

        let seed = {
            let store = HubStore::open(&db_path)?;
            let mut rng = StdRng::from_entropy();
            seed_population(&store, &self.config, &mut rng)?
        };
        self.advance(TrialPhase::Seeded);

        let proxy = if self.options.with_proxy {
            let default_target = format!("http://{SESSION_TARGET_IP}:{SESSION_TARGET_PORT}");
            Some(ProxyProcess::spawn(&default_target)?)
        } else {
            None
        };
        let lifecycle = Arc::new(NullSessionLifecycle::new());
        let routes: Arc<dyn RouteTable> = match &proxy {
            Some(proxy) => Arc::new(proxy.route_table()),
            None => Arc::new(InMemoryRouteTable::new()),
        };
        self.advance(TrialPhase::CollaboratorsInstalled);

        let mut hub_config = HubConfig::new(db_path);
        hub_config.page_limit = self.options.page_limit;
        let hub = Hub::new(hub_config, lifecycle, routes);

        // fresh cooperative scheduler, scoped to this trial and torn
        // down with it on every exit path
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StartupError::Scheduler)?;
        self.advance(TrialPhase::HubStarting);

        let (instrumented, restore, samples) = runtime.block_on(async {
            let http = reqwest::Client::new();
            if let Some(proxy) = &proxy {
                proxy.wait_ready(&http).await?;
            }

            let mut instrumented = InstrumentedHub::new(hub);
            instrumented.init_store()?;
            let restore = instrumented.restore_sessions().await?;
            let handle = instrumented.serve_api().await?;
            if self.config.population > 0 {
                instrumented.wait_ready(&http, &handle.api_url()).await?;
            }
            self.advance(TrialPhase::HubReady);

            let samples = if self.config.population == 0 {
                // degenerate trial: nothing to list, the api is never contacted
                vec![Duration::ZERO; MEASURE_ROUNDS]
            } else {
                let api =
                    ApiClient::new(http.clone(), handle.base_url(), seed.admin_token.clone());
                self.advance(TrialPhase::Measuring);
                api.measure(MEASURE_ROUNDS).await?
            };
            handle.shutdown().await;
            Ok::<_, TrialError>((instrumented, restore, samples))
        })?;
        drop(runtime);

        let result = TrialResult {
            running: restore.running as usize,
            startup: instrumented.startup_latency(),
            session_restore: instrumented.session_restore_latency(),
            first_api_round: samples.first().copied().unwrap_or_default(),
            second_api_round: samples.get(1).copied().unwrap_or_default(),
        };
        info!(
            population = self.config.population,
            requested = self.config.active,
            running = result.running,
            startup_secs = result.startup.as_secs_f64(),
            "trial complete"
        );
        Ok(result)
    }
}

pub fn run_trial(config: &TrialConfig, options: &TrialOptions) -> Result<TrialResult, TrialError> {
    TrialRunner::new(*config, options.clone()).run()
}
