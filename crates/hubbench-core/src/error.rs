use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("requested active count {active} exceeds population {population}")]
    ActiveExceedsPopulation { population: usize, active: usize },
    #[error("active fraction {fraction} is outside [0, 1]")]
    FractionOutOfRange { fraction: f64 },
    #[error("failed to load sweep spec {path}: {message}")]
    SpecFile { path: String, message: String },
}
