use crate::error::CommandError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// binary soil-moisture sensor: the device sends 0 for wet, 1 for dry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Humidity {
    Wet,
    Dry,
}

impl Humidity {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Wet),
            1 => Some(Self::Dry),
            _ => None,
        }
    }

    /// wire encoding used by both the device and the cloud
    pub fn code(self) -> u8 {
        match self {
            Self::Wet => 0,
            Self::Dry => 1,
        }
    }
}

/// one complete sample from the device
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reading {
    /// light level (LDR), lux
    pub luminosity: f32,
    pub humidity: Humidity,
    /// air temperature, celsius
    pub temperature: f32,
    pub observed_at: DateTime<Local>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActuatorId {
    Irrigator,
    Lamp,
    Heater,
    Cooler,
}

impl ActuatorId {
    pub const ALL: [ActuatorId; 4] = [Self::Irrigator, Self::Lamp, Self::Heater, Self::Cooler];

    /// name the microcontroller firmware uses in its toggle commands
    pub fn device_name(self) -> &'static str {
        match self {
            Self::Irrigator => "Irrigador",
            Self::Lamp => "Lampada",
            Self::Heater => "Aquecedor",
            Self::Cooler => "Refrigerador",
        }
    }

    pub fn from_device_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.device_name() == name)
    }

    /// the device command token that drives this actuator to `switch`
    pub fn command(self, switch: Switch) -> String {
        format!("toggle{}_{}", self.device_name(), switch)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Irrigator => 0,
            Self::Lamp => 1,
            Self::Heater => 2,
            Self::Cooler => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Switch {
    #[serde(rename = "ON")]
    On,
    #[default]
    #[serde(rename = "OFF")]
    Off,
}

impl Switch {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ON" => Some(Self::On),
            "OFF" => Some(Self::Off),
            _ => None,
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl fmt::Display for Switch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "ON",
            Self::Off => "OFF",
        })
    }
}

/// point-in-time copy of the actuator record, in the shape the cloud expects
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorSnapshot {
    #[serde(rename = "estadoIrrigador")]
    pub irrigator: Switch,
    #[serde(rename = "estadoLampada")]
    pub lamp: Switch,
    #[serde(rename = "estadoAquecedor")]
    pub heater: Switch,
    #[serde(rename = "estadoRefrigerador")]
    pub cooler: Switch,
    #[serde(rename = "estadoPilotoAutomatico")]
    pub auto_pilot: Switch,
}

// ==============================================================================
// thresholds
// ==============================================================================

pub const TEMP_LIMIT_RANGE: RangeInclusive<f32> = 10.0..=50.0;
pub const LUX_LIMIT_RANGE: RangeInclusive<f32> = 100.0..=1000.0;

/// auto-pilot set points, only changed through local-config commands
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Thresholds {
    pub temp_limit: f32,
    pub lux_limit: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { temp_limit: 30.0, lux_limit: 700.0 }
    }
}

impl Thresholds {
    pub fn set_temp_limit(&mut self, value: f32) -> Result<(), CommandError> {
        self.temp_limit = checked("limiteTemp", value, TEMP_LIMIT_RANGE)?;
        Ok(())
    }

    pub fn set_lux_limit(&mut self, value: f32) -> Result<(), CommandError> {
        self.lux_limit = checked("limiteLuz", value, LUX_LIMIT_RANGE)?;
        Ok(())
    }
}

fn checked(param: &'static str, value: f32, range: RangeInclusive<f32>) -> Result<f32, CommandError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(CommandError::OutOfRange {
            param,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}
