use std::time::{Duration, Instant};

use hubbench_hub::{ApiHandle, Hub, RestoreStats, StoreSummary};
use tracing::debug;

use crate::error::StartupError;

pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Phase-boundary offsets from the trial origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseMarks {
    pub store_ready: Option<Duration>,
    pub restore_started: Option<Duration>,
    pub restore_finished: Option<Duration>,
    pub api_bound: Option<Duration>,
    pub api_ready: Option<Duration>,
}

/// Wraps the hub's lifecycle entry points with timestamp capture
/// without altering its control flow. A restore failure still stamps
/// the completion slot, then re-raises.
pub struct InstrumentedHub {
    hub: Hub,
    origin: Instant,
    marks: PhaseMarks,
    restore_error: Option<String>,
}

impl InstrumentedHub {
    pub fn new(hub: Hub) -> Self {
        Self {
            hub,
            origin: Instant::now(),
            marks: PhaseMarks::default(),
            restore_error: None,
        }
    }

    pub fn init_store(&mut self) -> Result<StoreSummary, StartupError> {
        let summary = self.hub.init_store().map_err(StartupError::Hub)?;
        self.marks.store_ready = Some(self.origin.elapsed());
        Ok(summary)
    }

    pub async fn restore_sessions(&mut self) -> Result<RestoreStats, StartupError> {
        self.marks.restore_started = Some(self.origin.elapsed());
        let outcome = self.hub.restore_sessions().await;
        self.marks.restore_finished = Some(self.origin.elapsed());
        match outcome {
            Ok(stats) => Ok(stats),
            Err(err) => {
                self.restore_error = Some(err.to_string());
                Err(StartupError::Hub(err))
            }
        }
    }

    pub async fn serve_api(&mut self) -> Result<ApiHandle, StartupError> {
        let handle = self.hub.serve_api().await.map_err(StartupError::Hub)?;
        self.marks.api_bound = Some(self.origin.elapsed());
        Ok(handle)
    }

    pub async fn wait_ready(
        &mut self,
        client: &reqwest::Client,
        api_url: &str,
    ) -> Result<(), StartupError> {
        wait_for_http_server(client, api_url, READY_TIMEOUT).await?;
        self.marks.api_ready = Some(self.origin.elapsed());
        debug!(url = api_url, "hub api ready");
        Ok(())
    }

    pub fn marks(&self) -> &PhaseMarks {
        &self.marks
    }

    pub fn restore_error(&self) -> Option<&str> {
        self.restore_error.as_deref()
    }

    /// Origin to api-listener-bound, the cold-start metric.
    pub fn startup_latency(&self) -> Duration {
        self.marks.api_bound.unwrap_or_default()
    }

    pub fn session_restore_latency(&self) -> Duration {
        match (self.marks.restore_started, self.marks.restore_finished) {
            (Some(started), Some(finished)) => finished.saturating_sub(started),
            _ => Duration::ZERO,
        }
    }
}

/// Polls `url` on a fixed interval until anything answers, or fails
/// with `Unreachable` once the deadline passes.
pub async fn wait_for_http_server(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<(), StartupError> {
    let deadline = Instant::now() + timeout;
    loop {
        match client.get(url).send().await {
            Ok(_) => return Ok(()),
            Err(_) if Instant::now() < deadline => tokio::time::sleep(READY_POLL_INTERVAL).await,
            Err(_) => {
                return Err(StartupError::Unreachable {
                    url: url.to_string(),
                    waited: timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hubbench_core::TrialConfig;
    use hubbench_hub::{HubConfig, HubStore, InMemoryRouteTable, NullSessionLifecycle, DB_FILE_NAME};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::seed::seed_population;

    #[test]
    fn restore_completion_never_precedes_its_start() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join(DB_FILE_NAME);
        let store = HubStore::open(&db_path).unwrap();
        let config = TrialConfig {
            population: 30,
            active: 10,
        };
        let mut rng = StdRng::seed_from_u64(17);
        seed_population(&store, &config, &mut rng).unwrap();
        drop(store);

        let hub = Hub::new(
            HubConfig::new(db_path),
            Arc::new(NullSessionLifecycle::new()),
            Arc::new(InMemoryRouteTable::new()),
        );
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let mut instrumented = InstrumentedHub::new(hub);
        instrumented.init_store().unwrap();
        runtime.block_on(async {
            instrumented.restore_sessions().await.unwrap();
            let handle = instrumented.serve_api().await.unwrap();
            handle.shutdown().await;
        });

        let marks = instrumented.marks();
        let started = marks.restore_started.unwrap();
        let finished = marks.restore_finished.unwrap();
        assert!(finished >= started);
        assert!(marks.store_ready.unwrap() <= started);
        assert!(marks.api_bound.unwrap() >= finished);
        assert!(instrumented.restore_error().is_none());
        assert!(instrumented.startup_latency() >= instrumented.session_restore_latency());
    }

    #[test]
    fn readiness_poll_fails_when_nothing_listens() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let err = runtime.block_on(async {
            let client = reqwest::Client::new();
            // reserved port with no listener behind it
            wait_for_http_server(
                &client,
                "http://127.0.0.1:9/hub/api",
                Duration::from_millis(300),
            )
            .await
            .unwrap_err()
        });
        assert!(matches!(err, StartupError::Unreachable { .. }));
    }
}
