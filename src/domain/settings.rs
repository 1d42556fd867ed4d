use crate::domain::codec::MedicalFloat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error" or a full filter directive
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default)]
    pub rotation: LogRotation,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            rotation: LogRotation::default(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
        }
    }
}

/// Periods and delays for the simulation scheduler, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub battery_interval_ms: u64,
    pub heart_rate_interval_ms: u64,
    pub temperature_interval_ms: u64,
    pub blood_pressure_interval_ms: u64,
    pub glucose_interval_ms: u64,
    pub weight_interval_ms: u64,
    pub pulse_oximeter_interval_ms: u64,
    pub fitness_interval_ms: u64,
    pub environment_interval_ms: u64,
    pub time_interval_ms: u64,
    pub scale_interval_ms: u64,
    /// Delay between a scale history request and the history frame
    pub history_reply_delay_ms: u64,
    /// Delay between the first connection and the scheduler starting
    pub connect_start_delay_ms: u64,
    /// Start on first connection, stop when the last peer leaves
    pub auto_simulate_on_connect: bool,
    pub medical_float: MedicalFloat,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            battery_interval_ms: 30_000,
            heart_rate_interval_ms: 29_000,
            temperature_interval_ms: 60_000,
            blood_pressure_interval_ms: 45_000,
            glucose_interval_ms: 65_000,
            weight_interval_ms: 40_000,
            pulse_oximeter_interval_ms: 5_000,
            fitness_interval_ms: 1_000,
            environment_interval_ms: 10_000,
            time_interval_ms: 1_000,
            scale_interval_ms: 3_000,
            history_reply_delay_ms: 500,
            connect_start_delay_ms: 1_000,
            auto_simulate_on_connect: true,
            medical_float: MedicalFloat::Truncated,
        }
    }
}

impl SimulationSettings {
    pub fn history_reply_delay(&self) -> Duration {
        Duration::from_millis(self.history_reply_delay_ms)
    }

    pub fn connect_start_delay(&self) -> Duration {
        Duration::from_millis(self.connect_start_delay_ms)
    }
}

/// Strings served by the Device Information service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfoSettings {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware_revision: String,
}

impl Default for DeviceInfoSettings {
    fn default() -> Self {
        Self {
            manufacturer: "MyAndroidDevice".to_string(),
            model: "BLE-SIM-1".to_string(),
            serial: "1234-ABCD".to_string(),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Behavior of the in-process loopback host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackSettings {
    /// Confirm every submitted service immediately
    pub auto_confirm_registrations: bool,
    /// Connect a simulated central that subscribes to everything
    pub simulate_central: bool,
    pub central_address: String,
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self {
            auto_confirm_registrations: true,
            simulate_central: true,
            central_address: "00:11:22:33:44:55".to_string(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "ble_peripheral_sim".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub device_info: DeviceInfoSettings,
    #[serde(default)]
    pub loopback: LoopbackSettings,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load from `path`, falling back to defaults when it is missing or invalid
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                // Logging is not up yet when settings load
                eprintln!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BlePeripheralSim");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
