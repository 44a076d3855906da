use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TrialConfig;

pub const CSV_HEADER: &str = "users,active,running,startup,spawn,first_users,second_users";

/// Measured API rounds per trial, after the warm-up request.
pub const MEASURE_ROUNDS: usize = 2;

/// The timings collected from one completed trial. `running` is the
/// measured number of restored sessions, which can be below the
/// requested active count when sampling drew duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub running: usize,
    #[serde(with = "secs")]
    pub startup: Duration,
    #[serde(with = "secs")]
    pub session_restore: Duration,
    #[serde(with = "secs")]
    pub first_api_round: Duration,
    #[serde(with = "secs")]
    pub second_api_round: Duration,
}

impl TrialResult {
    pub fn csv_row(&self, config: &TrialConfig) -> String {
        format!(
            "{},{},{},{:.6},{:.6},{:.6},{:.6}",
            config.population,
            config.active,
            self.running,
            self.startup.as_secs_f64(),
            self.session_restore.as_secs_f64(),
            self.first_api_round.as_secs_f64(),
            self.second_api_round.as_secs_f64(),
        )
    }
}

mod secs {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(de::Error::custom(format!(
                "latency must be non-negative finite seconds, got {secs}"
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
