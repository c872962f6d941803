//! Simulator settings

use std::env;
use std::path::PathBuf;
use std::process;

use log::warn;

use wellbeing_core::storage::DB_FILE;

/// Store path override
pub const DB_PATH_VAR: &str = "WELLBEING_DB";

/// Pump profile speed-up factor
pub const SPEED_VAR: &str = "WELLBEING_SPEED";

/// Command-line flag for a throwaway store
pub const VOLATILE_FLAG: &str = "--volatile";

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Where the cycle log lives
    pub db_path: PathBuf,
    /// Divides the simulated pump's run and rest periods
    pub speed: f64,
    /// Store in the temp directory and delete it on exit
    pub volatile: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DB_FILE),
            speed: 1.0,
            volatile: false,
        }
    }
}

impl SimulatorConfig {
    /// Settings from the process arguments and environment.
    pub fn from_env() -> Self {
        Self::resolve(env::args().skip(1), |name| env::var(name).ok())
    }

    /// Defaults, overridden by the environment, then by flags.
    ///
    /// Unusable values are logged and ignored.
    pub fn resolve<I, F>(args: I, var: F) -> Self
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = var(DB_PATH_VAR).filter(|p| !p.is_empty()) {
            config.db_path = PathBuf::from(path);
        }

        if let Some(raw) = var(SPEED_VAR) {
            match raw.parse::<f64>() {
                Ok(speed) if speed.is_finite() && speed > 0.0 => config.speed = speed,
                _ => warn!(" Ignoring {}={:?}: expected a positive number", SPEED_VAR, raw),
            }
        }

        for arg in args {
            if arg == VOLATILE_FLAG {
                config.volatile = true;
                config.db_path =
                    env::temp_dir().join(format!("wellbeing-{}.bin", process::id()));
            } else {
                warn!(" Ignoring unknown argument {:?}", arg);
            }
        }

        config
    }
}
