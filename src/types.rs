use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const MIN_TEMPERATURE: Temperature = Temperature(5.0);
pub const MAX_TEMPERATURE: Temperature = Temperature(32.0);

pub const CALIBRATION_RANGE: (f64, f64) = (-1.0, 1.0);
pub const PID_WINDOW_LOW_RANGE: (f64, f64) = (0.0, 0.5);
pub const PID_WINDOW_HIGH_RANGE: (f64, f64) = (0.1, 0.5);

/// Temperature in Celsius, the only unit the Cosa cloud speaks.
/// The thermostat works in tenths of a degree.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(f64);

impl Temperature {
    pub const fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    /// Round to thermostat precision (0.1 increments).
    pub fn to_cosa_celsius(&self) -> f64 {
        round_tenths(self.0)
    }

    pub fn rounded(&self) -> Self {
        Self(self.to_cosa_celsius())
    }

    pub fn check_bounds(self) -> Result<Self> {
        check_range("temperature", self.0, (MIN_TEMPERATURE.0, MAX_TEMPERATURE.0))?;
        Ok(self.rounded())
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// Thermostat settings all travel with one decimal.
pub(crate) fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn check_range(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<f64> {
    if !value.is_finite() || value < min || value > max {
        return Err(Error::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// Vendor control mode. Only `Manual` gives us authority over targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    Auto,
    Manual,
    Schedule,
    NodeOn,
    NodeOff,
    Station,
    Turbo,
    Ventilation,
    Off,
    #[serde(other)]
    Other,
}

impl Mode {
    pub fn as_cosa_str(&self) -> &'static str {
        match self {
            Mode::Auto => "auto",
            Mode::Manual => "manual",
            Mode::Schedule => "schedule",
            Mode::NodeOn => "nodeOn",
            Mode::NodeOff => "nodeOff",
            Mode::Station => "station",
            Mode::Turbo => "turbo",
            Mode::Ventilation => "ventilation",
            Mode::Off => "off",
            Mode::Other => "other",
        }
    }
}

/// The endpoint "option" as the server stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Home,
    Sleep,
    Away,
    Frozen,
    Custom,
    Remote,
    Auto,
    Off,
}

impl Preset {
    pub fn as_cosa_str(&self) -> &'static str {
        match self {
            Preset::Home => "home",
            Preset::Sleep => "sleep",
            Preset::Away => "away",
            Preset::Frozen => "frozen",
            Preset::Custom => "custom",
            Preset::Remote => "remote",
            Preset::Auto => "auto",
            Preset::Off => "off",
        }
    }

    pub fn from_cosa_str(s: &str) -> Option<Self> {
        match s {
            "home" => Some(Preset::Home),
            "sleep" => Some(Preset::Sleep),
            "away" => Some(Preset::Away),
            "frozen" => Some(Preset::Frozen),
            "custom" => Some(Preset::Custom),
            "remote" => Some(Preset::Remote),
            "auto" => Some(Preset::Auto),
            "off" => Some(Preset::Off),
            _ => None,
        }
    }
}

/// User-selectable presets. "Off" is stored server-side as `frozen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetChoice {
    Home,
    Away,
    Sleep,
    Custom,
    Off,
}

impl PresetChoice {
    pub const ALL: [PresetChoice; 5] = [
        PresetChoice::Home,
        PresetChoice::Away,
        PresetChoice::Sleep,
        PresetChoice::Custom,
        PresetChoice::Off,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PresetChoice::Home => "Home",
            PresetChoice::Away => "Away",
            PresetChoice::Sleep => "Sleep",
            PresetChoice::Custom => "Custom",
            PresetChoice::Off => "Off",
        }
    }

    /// Case-insensitive, so both "Home" and "home" resolve.
    pub fn from_label(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidPreset(s.to_string()))
    }

    pub fn to_preset(self) -> Preset {
        match self {
            PresetChoice::Home => Preset::Home,
            PresetChoice::Away => Preset::Away,
            PresetChoice::Sleep => Preset::Sleep,
            PresetChoice::Custom => Preset::Custom,
            PresetChoice::Off => Preset::Frozen,
        }
    }

    pub fn from_preset(preset: Preset) -> Option<Self> {
        match preset {
            Preset::Home => Some(PresetChoice::Home),
            Preset::Away => Some(PresetChoice::Away),
            Preset::Sleep => Some(PresetChoice::Sleep),
            Preset::Custom => Some(PresetChoice::Custom),
            Preset::Frozen => Some(PresetChoice::Off),
            Preset::Remote | Preset::Auto | Preset::Off => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacMode {
    Heat,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombiSettings {
    #[serde(default = "default_heating")]
    pub heating: bool,
    pub pid_window_low: f64,
    pub pid_window_high: f64,
}

fn default_heating() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetTemperatures {
    pub away: Temperature,
    pub custom: Temperature,
    pub home: Temperature,
    pub sleep: Temperature,
}

/// Entry of the endpoint list; detail is fetched separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub temperature: Option<Temperature>,
    #[serde(default)]
    pub humidity: Option<f64>,
    pub mode: Mode,
    pub option: Preset,
    #[serde(default)]
    pub previous_option: Option<Preset>,
    #[serde(default)]
    pub target_temperature: Option<Temperature>,
    pub home_temperature: Temperature,
    pub away_temperature: Temperature,
    pub sleep_temperature: Temperature,
    pub custom_temperature: Temperature,
    #[serde(default)]
    pub combi_settings: Option<CombiSettings>,
    #[serde(default)]
    pub combi_state: Option<String>,
    #[serde(default)]
    pub calibration: Option<f64>,
    #[serde(default)]
    pub place: Option<String>,
}

impl Endpoint {
    pub fn preset_choice(&self) -> Option<PresetChoice> {
        PresetChoice::from_preset(self.option)
    }

    pub fn is_preset_selected(&self, choice: PresetChoice) -> bool {
        self.option == choice.to_preset()
    }

    pub fn hvac_mode(&self) -> HvacMode {
        if self.option == Preset::Frozen {
            HvacMode::Off
        } else {
            HvacMode::Heat
        }
    }

    /// Whether the boiler relay is currently on.
    pub fn is_heating(&self) -> bool {
        self.combi_state.as_deref() == Some("on")
    }

    pub fn pid_window_low(&self) -> Option<f64> {
        self.combi_settings.map(|c| c.pid_window_low)
    }

    pub fn pid_window_high(&self) -> Option<f64> {
        self.combi_settings.map(|c| c.pid_window_high)
    }

    /// Stored target for a preset slot. `None` for options without one.
    pub fn preset_temperature(&self, preset: Preset) -> Option<Temperature> {
        match preset {
            Preset::Home => Some(self.home_temperature),
            Preset::Away => Some(self.away_temperature),
            Preset::Sleep => Some(self.sleep_temperature),
            Preset::Custom => Some(self.custom_temperature),
            Preset::Frozen => Some(MIN_TEMPERATURE),
            Preset::Remote | Preset::Auto | Preset::Off => None,
        }
    }

    pub(crate) fn preset_slot_mut(&mut self, preset: Preset) -> Option<&mut Temperature> {
        match preset {
            Preset::Home => Some(&mut self.home_temperature),
            Preset::Away => Some(&mut self.away_temperature),
            Preset::Sleep => Some(&mut self.sleep_temperature),
            Preset::Custom => Some(&mut self.custom_temperature),
            _ => None,
        }
    }

    pub fn target_temperatures(&self) -> TargetTemperatures {
        TargetTemperatures {
            away: self.away_temperature,
            custom: self.custom_temperature,
            home: self.home_temperature,
            sleep: self.sleep_temperature,
        }
    }
}

/// Partial update for `setTargetTemperatures`; unset slots keep the endpoint's values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TargetTemperatureOverrides {
    pub home: Option<Temperature>,
    pub away: Option<Temperature>,
    pub sleep: Option<Temperature>,
    pub custom: Option<Temperature>,
}

impl TargetTemperatureOverrides {
    pub fn for_preset(preset: Preset, temp: Temperature) -> Option<Self> {
        let mut overrides = Self::default();
        match preset {
            Preset::Home => overrides.home = Some(temp),
            Preset::Away => overrides.away = Some(temp),
            Preset::Sleep => overrides.sleep = Some(temp),
            Preset::Custom => overrides.custom = Some(temp),
            _ => return None,
        }
        Some(overrides)
    }

    pub fn resolve(&self, endpoint: &Endpoint) -> TargetTemperatures {
        TargetTemperatures {
            away: self.away.unwrap_or(endpoint.away_temperature),
            custom: self.custom.unwrap_or(endpoint.custom_temperature),
            home: self.home.unwrap_or(endpoint.home_temperature),
            sleep: self.sleep.unwrap_or(endpoint.sleep_temperature),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidWindowOverrides {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl PidWindowOverrides {
    pub fn resolve(&self, endpoint: &Endpoint) -> Result<CombiSettings> {
        let current = endpoint.combi_settings;
        let low = self
            .low
            .or(current.map(|c| c.pid_window_low))
            .ok_or(Error::MissingField("combiSettings.pidWindowLow"))?;
        let high = self
            .high
            .or(current.map(|c| c.pid_window_high))
            .ok_or(Error::MissingField("combiSettings.pidWindowHigh"))?;
        Ok(CombiSettings {
            heating: true,
            pid_window_low: low,
            pid_window_high: high,
        })
    }
}

/// All endpoints visible at the last successful refresh.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub version: u64,
    pub endpoints: Arc<Vec<Endpoint>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn get(&self, idx: usize) -> Option<&Endpoint> {
        self.endpoints.get(idx)
    }

    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.endpoints.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshStatus {
    pub last_update_success: bool,
    pub last_error: Option<String>,
    pub auth_required: bool,
    pub cycles: u64,
}
