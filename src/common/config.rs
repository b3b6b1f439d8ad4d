use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::icon_engine::reposition::RepositionTuning;

pub fn data_dir() -> PathBuf {
    dirs::home_dir().unwrap().join(".tuckbar")
}

pub fn layout_file() -> PathBuf {
    data_dir().join("layout.json")
}

pub fn config_file() -> PathBuf {
    dirs::home_dir().unwrap().join(".config").join("tuckbar").join("config.toml")
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Frame polling cadence during a move, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long one press/release phase may wait for a frame change.
    #[serde(default = "default_phase_timeout_ms")]
    pub phase_timeout_ms: u64,
    #[serde(default = "default_max_move_attempts")]
    pub max_move_attempts: u32,
    /// Nudge an unresponsive owner with a pointer event between attempts.
    #[serde(default = "yes")]
    pub wake_between_attempts: bool,
    /// Delay before a capture pass so the panel has finished rendering.
    #[serde(default = "default_panel_settle_ms")]
    pub panel_settle_ms: u64,
    #[serde(default = "yes")]
    pub on_screen_only: bool,
    #[serde(default = "yes")]
    pub active_space_only: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            phase_timeout_ms: default_phase_timeout_ms(),
            max_move_attempts: default_max_move_attempts(),
            wake_between_attempts: true,
            panel_settle_ms: default_panel_settle_ms(),
            on_screen_only: true,
            active_space_only: true,
        }
    }
}

impl Settings {
    pub fn reposition_tuning(&self) -> RepositionTuning {
        RepositionTuning {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            phase_timeout: Duration::from_millis(self.phase_timeout_ms),
            max_attempts: self.max_move_attempts,
            wake_between_attempts: self.wake_between_attempts,
        }
    }

    pub fn panel_settle(&self) -> Duration {
        Duration::from_millis(self.panel_settle_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
}

impl Config {
    pub fn read(path: &Path) -> anyhow::Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

fn yes() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_phase_timeout_ms() -> u64 {
    50
}

fn default_max_move_attempts() -> u32 {
    3
}

fn default_panel_settle_ms() -> u64 {
    100
}
