use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::device::DeviceKind;

/// Unit the hub reports temperatures in, from the `CORF` field of its DCB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_corf(s: &str) -> Option<Self> {
        match s {
            "C" => Some(TemperatureUnit::Celsius),
            "F" => Some(TemperatureUnit::Fahrenheit),
            _ => None,
        }
    }

    pub fn as_corf(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "C",
            TemperatureUnit::Fahrenheit => "F",
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\u{00b0}{}", self.as_corf())
    }
}

/// A zone as listed by `GET_ZONES`. The id is the hub's internal alias for
/// the name; every call here addresses devices by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    pub name: String,
    pub id: u64,
}

/// Changes observed in the device model.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A device was seen with a supported type code for the first time.
    DeviceClassified { name: String, kind: DeviceKind },
    /// A field of an already-known record changed, either on refresh or
    /// through an accepted command.
    FieldChanged {
        device: String,
        field: String,
        old: Value,
        new: Value,
    },
    ZoneRenamed { old: String, new: String },
    ZoneRemoved { name: String },
}
