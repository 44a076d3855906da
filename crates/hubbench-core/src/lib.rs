pub mod config;
pub mod error;
pub mod result;

pub use config::{
    parameter_grid, ParameterGrid, SweepSpec, TrialConfig, DEFAULT_FRACTIONS, DEFAULT_PAGE_LIMIT,
    DEFAULT_POPULATIONS,
};
pub use error::ConfigError;
pub use result::{TrialResult, CSV_HEADER, MEASURE_ROUNDS};
