pub mod client;
pub mod error;
pub mod instrument;
pub mod proxy;
pub mod seed;
pub mod sweep;
pub mod trial;

pub use client::{next_offset, ApiClient};
pub use error::{ApiError, StartupError, SweepError, TrialError};
pub use instrument::{wait_for_http_server, InstrumentedHub, PhaseMarks};
pub use proxy::{ProxyProcess, ProxyRouteTable};
pub use seed::{seed_population, SeedSummary, SESSION_TARGET_IP, SESSION_TARGET_PORT};
pub use sweep::{
    parse_worker_output, read_worker_input, run_sweep, write_worker_output, ExecutorKind,
    SweepOptions,
};
pub use trial::{run_trial, TrialOptions, TrialPhase, TrialRunner};
