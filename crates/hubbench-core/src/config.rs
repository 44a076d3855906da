use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_POPULATIONS: &[usize] = &[10, 50, 100, 500, 1000, 2000, 5000];
pub const DEFAULT_FRACTIONS: &[f64] = &[0.0, 0.25, 1.0];
pub const DEFAULT_PAGE_LIMIT: u64 = 50;

/// One (population, requested-active) benchmark configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialConfig {
    pub population: usize,
    pub active: usize,
}

impl TrialConfig {
    pub fn new(population: usize, active: usize) -> Result<Self, ConfigError> {
        let config = Self { population, active };
        config.validate()?;
        Ok(config)
    }

    // Rejected before any seeding I/O happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.active > self.population {
            return Err(ConfigError::ActiveExceedsPopulation {
                population: self.population,
                active: self.active,
            });
        }
        Ok(())
    }
}

pub type ParameterGrid = Vec<TrialConfig>;

/// Cross product of population sizes and active fractions, in program
/// order: populations outer, fractions inner. The active count is the
/// truncated product, so `fraction = 0.25, population = 10` requests 2.
pub fn parameter_grid(
    populations: &[usize],
    fractions: &[f64],
) -> Result<ParameterGrid, ConfigError> {
    for &fraction in fractions {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(ConfigError::FractionOutOfRange { fraction });
        }
    }
    let mut grid = Vec::with_capacity(populations.len() * fractions.len());
    for &population in populations {
        for &fraction in fractions {
            let active = (fraction * population as f64) as usize;
            grid.push(TrialConfig { population, active });
        }
    }
    Ok(grid)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepSpec {
    pub populations: Vec<usize>,
    pub fractions: Vec<f64>,
    #[serde(default)]
    pub with_proxy: bool,
    #[serde(default = "default_page_limit")]
    pub page_limit: u64,
}

fn default_page_limit() -> u64 {
    DEFAULT_PAGE_LIMIT
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self {
            populations: DEFAULT_POPULATIONS.to_vec(),
            fractions: DEFAULT_FRACTIONS.to_vec(),
            with_proxy: false,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl SweepSpec {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::SpecFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::SpecFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn grid(&self) -> Result<ParameterGrid, ConfigError> {
        parameter_grid(&self.populations, &self.fractions)
    }
}
