use serde::Serialize;
use serde_json::{Map, Value, json};

/// One entry of the hub's JSON command vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    /// The `result` string the hub sends on success. `None` for queries,
    /// whose reply is handed back to the caller as-is.
    pub success: Option<&'static str>,
    /// Whether the command may change hub-side state.
    pub mutating: bool,
}

impl CommandSpec {
    const fn command(name: &'static str, success: &'static str) -> Self {
        Self {
            name,
            success: Some(success),
            mutating: true,
        }
    }

    const fn query(name: &'static str) -> Self {
        Self {
            name,
            success: None,
            mutating: false,
        }
    }
}

pub const AWAY_ON: CommandSpec = CommandSpec::command("AWAY_ON", "away on");
pub const AWAY_OFF: CommandSpec = CommandSpec::command("AWAY_OFF", "away off");
pub const BOOST_ON: CommandSpec = CommandSpec::command("BOOST_ON", "boost on");
pub const BOOST_OFF: CommandSpec = CommandSpec::command("BOOST_OFF", "boost off");
pub const FROST_ON: CommandSpec = CommandSpec::command("FROST_ON", "frost on");
pub const FROST_OFF: CommandSpec = CommandSpec::command("FROST_OFF", "frost off");
pub const SET_FROST: CommandSpec = CommandSpec::command("SET_FROST", "temperature was set");
pub const SET_PREHEAT: CommandSpec = CommandSpec::command("SET_PREHEAT", "max preheat was set");
pub const SET_TEMP: CommandSpec = CommandSpec::command("SET_TEMP", "temperature was set");
pub const CREATE_GROUP: CommandSpec = CommandSpec::command("CREATE_GROUP", "group created");
pub const DELETE_GROUP: CommandSpec = CommandSpec::command("DELETE_GROUP", "group removed");
pub const ZONE_TITLE: CommandSpec = CommandSpec::command("ZONE_TITLE", "zone renamed");
pub const REMOVE_ZONE: CommandSpec = CommandSpec::command("REMOVE_ZONE", "zone removed");
// "overide" is the hub's spelling
pub const TIMER_ON: CommandSpec = CommandSpec::command("TIMER_ON", "time clock overide on");
pub const TIMER_OFF: CommandSpec = CommandSpec::command("TIMER_OFF", "timers off");

pub const GET_ZONES: CommandSpec = CommandSpec::query("GET_ZONES");
pub const GET_TEMPLOG: CommandSpec = CommandSpec::query("GET_TEMPLOG");
pub const FIRMWARE: CommandSpec = CommandSpec::query("FIRMWARE");
pub const READ_DCB: CommandSpec = CommandSpec::query("READ_DCB");
pub const INFO: CommandSpec = CommandSpec::query("INFO");
pub const ENGINEERS_DATA: CommandSpec = CommandSpec::query("ENGINEERS_DATA");

/// Arbitrary payload from [`crate::NeoHub::call`]. Its effects are unknown,
/// so it counts as mutating.
const RAW: CommandSpec = CommandSpec {
    name: "RAW",
    success: None,
    mutating: true,
};

pub const DEFAULT_PORT: u16 = 4242;

/// What a device-addressed command acts on.
///
/// The hub accepts a device name, a group name, or a list of device names
/// anywhere a device is expected. Membership is not checked client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Target {
    Device(String),
    Devices(Vec<String>),
    Group(String),
}

impl Target {
    pub fn group(name: impl Into<String>) -> Self {
        Target::Group(name.into())
    }

    /// Device names this target spells out. Groups resolve hub-side, so
    /// they name nothing here.
    pub fn device_names(&self) -> &[String] {
        match self {
            Target::Device(name) => std::slice::from_ref(name),
            Target::Devices(names) => names,
            Target::Group(_) => &[],
        }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::Device(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::Device(name)
    }
}

impl From<&String> for Target {
    fn from(name: &String) -> Self {
        Target::Device(name.clone())
    }
}

impl From<Vec<String>> for Target {
    fn from(names: Vec<String>) -> Self {
        Target::Devices(names)
    }
}

impl From<&[&str]> for Target {
    fn from(names: &[&str]) -> Self {
        Target::Devices(names.iter().map(|n| n.to_string()).collect())
    }
}

/// Duration argument of `BOOST_ON` / `BOOST_OFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoostInterval {
    pub hours: u32,
    pub minutes: u32,
}

impl BoostInterval {
    pub fn new(hours: u32, minutes: u32) -> Self {
        Self { hours, minutes }
    }
}

/// A single request: the vocabulary entry plus its wire payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    spec: CommandSpec,
    payload: Value,
}

impl Command {
    pub fn new(spec: CommandSpec, args: Value) -> Self {
        let mut payload = Map::new();
        payload.insert(spec.name.to_string(), args);
        Self {
            spec,
            payload: Value::Object(payload),
        }
    }

    pub fn raw(payload: Value) -> Self {
        Self { spec: RAW, payload }
    }

    /// Catalogue name, or the payload's first key for raw commands.
    pub fn name(&self) -> &str {
        match self.payload.as_object().and_then(|m| m.keys().next()) {
            Some(key) if self.spec == RAW => key.as_str(),
            _ => self.spec.name,
        }
    }

    pub fn spec(&self) -> CommandSpec {
        self.spec
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn is_mutating(&self) -> bool {
        self.spec.mutating
    }

    pub fn expected_reply(&self) -> Option<Value> {
        self.spec.success.map(|result| json!({ "result": result }))
    }
}

pub fn info() -> Command {
    Command::new(INFO, json!("0"))
}

pub fn engineers_data() -> Command {
    Command::new(ENGINEERS_DATA, json!("0"))
}

pub fn get_zones() -> Command {
    Command::new(GET_ZONES, json!(0))
}

pub fn read_dcb() -> Command {
    Command::new(READ_DCB, json!(100))
}

pub fn firmware() -> Command {
    Command::new(FIRMWARE, json!(0))
}

pub fn get_templog(target: &Target) -> Command {
    Command::new(GET_TEMPLOG, json!(target))
}

pub fn away(target: &Target, on: bool) -> Command {
    let spec = if on { AWAY_ON } else { AWAY_OFF };
    Command::new(spec, json!(target))
}

pub fn boost(target: &Target, interval: BoostInterval, on: bool) -> Command {
    let spec = if on { BOOST_ON } else { BOOST_OFF };
    Command::new(spec, json!([interval, target]))
}

pub fn frost(target: &Target, on: bool) -> Command {
    let spec = if on { FROST_ON } else { FROST_OFF };
    Command::new(spec, json!(target))
}

pub fn set_frost(target: &Target, temp: i32) -> Command {
    Command::new(SET_FROST, json!([temp, target]))
}

pub fn set_preheat(target: &Target, temp: i32) -> Command {
    Command::new(SET_PREHEAT, json!([temp, target]))
}

pub fn set_temp(target: &Target, temp: i32) -> Command {
    Command::new(SET_TEMP, json!([temp, target]))
}

pub fn create_group(devices: &[String], name: &str) -> Command {
    Command::new(CREATE_GROUP, json!([devices, name]))
}

pub fn delete_group(name: &str) -> Command {
    Command::new(DELETE_GROUP, json!(name))
}

pub fn zone_title(old_name: &str, new_name: &str) -> Command {
    Command::new(ZONE_TITLE, json!([old_name, new_name]))
}

pub fn remove_zone(target: &Target) -> Command {
    Command::new(REMOVE_ZONE, json!(target))
}

pub fn timer(target: &Target, on: bool) -> Command {
    let spec = if on { TIMER_ON } else { TIMER_OFF };
    Command::new(spec, json!(target))
}
