use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::cache::{DeviceRecord, FROST_ENABLED, STANDBY};
use crate::client::NeoHub;
use crate::protocol::{self, Target};
use crate::Result;

const CURRENT_TEMPERATURE: &str = "CURRENT_TEMPERATURE";
const CURRENT_SET_TEMPERATURE: &str = "CURRENT_SET_TEMPERATURE";
const HOLD_TEMPERATURE: &str = "HOLD_TEMPERATURE";
const TEMP_HOLD: &str = "TEMP_HOLD";
const FROST_TEMPERATURE: &str = "FROST TEMPERATURE";
const HEATING: &str = "HEATING";
const TIME_CLOCK_OVERIDE_BIT: &str = "TIME_CLOCK_OVERIDE_BIT";
const TIMER: &str = "TIMER";

/// Which typed handle a device gets, from its `DEVICE_TYPE` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DeviceKind {
    Thermostat,
    RelayPlug,
}

impl DeviceKind {
    pub fn from_type_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(DeviceKind::Thermostat),
            6 => Some(DeviceKind::RelayPlug),
            _ => None,
        }
    }

    pub fn type_code(&self) -> i64 {
        match self {
            DeviceKind::Thermostat => 1,
            DeviceKind::RelayPlug => 6,
        }
    }
}

/// A thermostat zone.
///
/// Holds only the device name. Every getter reads the hub's current cached
/// record, and setters patch that record once the hub accepts the command,
/// so handles stay valid across refreshes.
///
/// Getters return `None` while the field is missing, e.g. before the first
/// refresh or after the zone was removed.
#[derive(Clone)]
pub struct Thermostat<'a> {
    hub: &'a NeoHub,
    name: String,
}

impl<'a> Thermostat<'a> {
    pub(crate) fn new(hub: &'a NeoHub, name: String) -> Self {
        Self { hub, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<u64> {
        self.read(DeviceRecord::id)
    }

    /// Copy of the full backing record.
    pub fn record(&self) -> Option<DeviceRecord> {
        self.hub.device(&self.name)
    }

    /// Temperature measured at the thermostat.
    pub fn current_temperature(&self) -> Option<f64> {
        self.read(|r| r.get_f64(CURRENT_TEMPERATURE))
    }

    pub fn is_heating(&self) -> Option<bool> {
        self.read(|r| r.get_bool(HEATING))
    }

    /// Whether frost (standby) mode is on.
    pub fn is_frosted(&self) -> Option<bool> {
        self.read(|r| r.get_bool(STANDBY))
    }

    /// Frost threshold, whether or not frost mode is on.
    pub fn frost_temperature(&self) -> Option<f64> {
        self.read(|r| r.get_f64(FROST_TEMPERATURE))
    }

    /// Whether a manual hold is overriding the program.
    pub fn is_temperature_held(&self) -> Option<bool> {
        self.read(|r| r.get_bool(TEMP_HOLD))
    }

    pub fn hold_temperature(&self) -> Option<f64> {
        self.read(|r| r.get_f64(HOLD_TEMPERATURE))
    }

    /// The current set temperature. The hub reverts it at the next program
    /// change; the next refresh reflects that.
    pub fn set_temperature(&self) -> Option<f64> {
        self.read(|r| r.get_f64(CURRENT_SET_TEMPERATURE))
    }

    pub async fn set_set_temperature(&self, temp: i32) -> Result<bool> {
        let command = protocol::set_temp(&self.target(), temp);
        self.hub
            .mutate(&self.name, command, &[(CURRENT_SET_TEMPERATURE, Value::from(temp))])
            .await
    }

    pub async fn set_frost_temperature(&self, temp: i32) -> Result<bool> {
        let command = protocol::set_frost(&self.target(), temp);
        self.hub
            .mutate(&self.name, command, &[(FROST_TEMPERATURE, Value::from(temp))])
            .await
    }

    pub async fn set_frost_on(&self) -> Result<bool> {
        self.set_frost(true).await
    }

    pub async fn set_frost_off(&self) -> Result<bool> {
        self.set_frost(false).await
    }

    async fn set_frost(&self, on: bool) -> Result<bool> {
        let command = protocol::frost(&self.target(), on);
        self.hub
            .mutate(
                &self.name,
                command,
                &[(STANDBY, Value::Bool(on)), (FROST_ENABLED, Value::Bool(on))],
            )
            .await
    }

    fn target(&self) -> Target {
        Target::from(&self.name)
    }

    fn read<T>(&self, f: impl FnOnce(&DeviceRecord) -> Option<T>) -> Option<T> {
        self.hub.read_record(&self.name, f)
    }
}

impl fmt::Debug for Thermostat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thermostat").field("name", &self.name).finish()
    }
}

impl fmt::Display for Thermostat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(id) = self.id() {
            write!(f, " #{id}")?;
        }
        match self.current_temperature() {
            Some(temp) => write!(f, " {temp:.1}\u{00b0}")?,
            None => write!(f, " --")?,
        }
        let frost = if self.is_frosted().unwrap_or(false) { "on" } else { "off" };
        write!(f, " frost={frost}")
    }
}

/// A switched mains plug.
///
/// Same lookup-by-name model as [`Thermostat`].
#[derive(Clone)]
pub struct RelayPlug<'a> {
    hub: &'a NeoHub,
    name: String,
}

impl<'a> RelayPlug<'a> {
    pub(crate) fn new(hub: &'a NeoHub, name: String) -> Self {
        Self { hub, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<u64> {
        self.hub.read_record(&self.name, DeviceRecord::id)
    }

    pub fn record(&self) -> Option<DeviceRecord> {
        self.hub.device(&self.name)
    }

    /// On only when both the override bit and the timer are set.
    pub fn is_on(&self) -> bool {
        self.hub
            .read_record(&self.name, |r| {
                Some(r.get_bool(TIME_CLOCK_OVERIDE_BIT)? && r.get_bool(TIMER)?)
            })
            .unwrap_or(false)
    }

    pub async fn switch_on(&self) -> Result<bool> {
        self.switch(true).await
    }

    pub async fn switch_off(&self) -> Result<bool> {
        self.switch(false).await
    }

    async fn switch(&self, on: bool) -> Result<bool> {
        let command = protocol::timer(&Target::from(&self.name), on);
        self.hub
            .mutate(
                &self.name,
                command,
                &[(TIME_CLOCK_OVERIDE_BIT, Value::Bool(on)), (TIMER, Value::Bool(on))],
            )
            .await
    }
}

impl fmt::Debug for RelayPlug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayPlug").field("name", &self.name).finish()
    }
}

impl fmt::Display for RelayPlug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(id) = self.id() {
            write!(f, " #{id}")?;
        }
        write!(f, " {}", if self.is_on() { "ON" } else { "OFF" })
    }
}
