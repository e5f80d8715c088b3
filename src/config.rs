use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = ".hindsightrc";

// Defaults for the analysis knobs; command-line values override these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub plot_size: usize,
    pub node_count: usize,
    pub edge_min_value: f64,
    pub top_count: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            plot_size: 20,
            node_count: 33,
            edge_min_value: 0.05,
            top_count: 30,
        }
    }
}

impl AnalysisConfig {
    pub fn save(&self) -> io::Result<()> {
        let home = env::var("HOME").expect("HOME environment variable not set");
        let config_path = PathBuf::from(home).join(CONFIG_FILE);
        let config_str = toml::to_string(self).expect("Failed to serialize config");
        fs::write(config_path, config_str)
    }

    pub fn load() -> Option<Self> {
        let home = env::var("HOME").ok()?;
        let config_path = PathBuf::from(home).join(CONFIG_FILE);
        let config_str = fs::read_to_string(config_path).ok()?;
        toml::from_str(&config_str).ok()
    }
}

pub fn get_config() -> AnalysisConfig {
    // fall back to the built-in defaults when there is no rc file //
    AnalysisConfig::load().unwrap_or_default()
}
