use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::device::DeviceKind;
use crate::diff::diff_fields;
use crate::types::{Event, Zone};
use crate::{Error, Result};

pub const ID: &str = "id";
pub const DEVICE: &str = "device";
pub const DEVICE_TYPE: &str = "DEVICE_TYPE";
pub const STANDBY: &str = "STANDBY";
/// Alias of `STANDBY` added on every merge.
pub const FROST_ENABLED: &str = "frost_enabled";

/// All fields the hub reported for one device: its `INFO` entry merged with
/// its `ENGINEERS_DATA` entry, plus derived fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceRecord {
    fields: Map<String, Value>,
}

impl DeviceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Numeric field. The hub sends some numbers as strings (`"21.5"`).
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        match self.fields.get(field)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Flag field. Accepts JSON booleans and 0/1 numbers.
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        match self.fields.get(field)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            _ => None,
        }
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<u64> {
        self.fields.get(ID).and_then(Value::as_u64)
    }

    pub fn device_type(&self) -> Option<i64> {
        self.get_i64(DEVICE_TYPE)
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.to_string(), value.into())
    }

    fn merge(&mut self, fields: Map<String, Value>) {
        self.fields.extend(fields);
    }
}

/// Device name to record, as handed out by refresh.
pub type Snapshot = BTreeMap<String, DeviceRecord>;

/// Owns every device record and decides when they need re-reading.
///
/// Handles and callers only ever hold device names; the records themselves
/// never leave the cache except as clones.
#[derive(Debug)]
pub struct StateCache {
    devices: BTreeMap<String, DeviceRecord>,
    kinds: BTreeMap<String, DeviceKind>,
    unsupported: BTreeSet<String>,
    max_age: Duration,
    last_refresh: Option<Instant>,
    dirty: bool,
    in_progress: bool,
}

impl StateCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            devices: BTreeMap::new(),
            kinds: BTreeMap::new(),
            unsupported: BTreeSet::new(),
            max_age,
            last_refresh: None,
            dirty: false,
            in_progress: false,
        }
    }

    /// Replace the device list with the zones from a `GET_ZONES` reply
    /// (`{"Kitchen": 1, "Lounge": 2}`). Each zone gets a record holding
    /// only its id until the next refresh.
    pub fn load_zones(&mut self, reply: &Value) -> Result<Vec<Zone>> {
        let map = reply
            .as_object()
            .ok_or_else(|| Error::Protocol(format!("GET_ZONES reply is not an object: {reply}")))?;

        let mut zones = Vec::with_capacity(map.len());
        for (name, id) in map {
            let id = id.as_u64().ok_or_else(|| {
                Error::Protocol(format!("zone {name:?} has a non-numeric id: {id}"))
            })?;
            zones.push(Zone {
                name: name.clone(),
                id,
            });
        }

        self.devices = zones
            .iter()
            .map(|zone| {
                let mut record = DeviceRecord::new();
                record.set(ID, zone.id);
                (zone.name.clone(), record)
            })
            .collect();
        let devices = &self.devices;
        self.kinds.retain(|name, _| devices.contains_key(name));
        self.unsupported.retain(|name| devices.contains_key(name));

        debug!(count = zones.len(), "loaded zones");
        Ok(zones)
    }

    pub fn zones(&self) -> Vec<Zone> {
        self.devices
            .iter()
            .filter_map(|(name, record)| {
                Some(Zone {
                    name: name.clone(),
                    id: record.id()?,
                })
            })
            .collect()
    }

    pub fn is_due(&self, force: bool, now: Instant) -> bool {
        force
            || self.dirty
            || self
                .last_refresh
                .is_none_or(|last| now.duration_since(last) >= self.max_age)
    }

    /// Claim the refresh if one is due and none is running.
    ///
    /// Returns `false` when the caller should just use the current snapshot.
    /// On `true` the caller must finish with [`StateCache::complete_refresh`]
    /// or [`StateCache::abort_refresh`].
    pub fn try_begin_refresh(&mut self, force: bool, now: Instant) -> bool {
        if self.in_progress {
            trace!("refresh already in progress, serving cached state");
            return false;
        }
        if !self.is_due(force, now) {
            trace!("device state served from cache");
            return false;
        }
        self.in_progress = true;
        self.dirty = false;
        true
    }

    /// Merge `INFO` and `ENGINEERS_DATA` replies into the records and
    /// classify newly seen devices.
    pub fn complete_refresh(&mut self, info: &Value, engineers: &Value, now: Instant) -> Result<Vec<Event>> {
        self.in_progress = false;
        match self.merge(info, engineers) {
            Ok(events) => {
                self.last_refresh = Some(now);
                Ok(events)
            }
            Err(e) => {
                self.dirty = true;
                Err(e)
            }
        }
    }

    pub fn abort_refresh(&mut self) {
        self.in_progress = false;
        self.dirty = true;
    }

    fn merge(&mut self, info: &Value, engineers: &Value) -> Result<Vec<Event>> {
        let devices = info
            .get("devices")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Protocol("INFO reply has no device list".into()))?;
        let engineers = engineers
            .as_object()
            .ok_or_else(|| Error::Protocol("ENGINEERS_DATA reply is not an object".into()))?;

        // stage everything first so a malformed reply leaves the cache untouched
        let mut staged = Vec::with_capacity(devices.len());
        for entry in devices {
            let Some(fields) = entry.as_object() else {
                warn!(entry = %entry, "skipping INFO entry that is not an object");
                continue;
            };
            let Some(name) = fields.get(DEVICE).and_then(Value::as_str) else {
                warn!(entry = %entry, "skipping INFO entry without a device name");
                continue;
            };

            let mut merged = fields.clone();
            match engineers.get(name).and_then(Value::as_object) {
                Some(extra) => merged.extend(extra.clone()),
                None => debug!(device = name, "no ENGINEERS_DATA entry"),
            }
            if let Some(standby) = merged.get(STANDBY).cloned() {
                merged.insert(FROST_ENABLED.to_string(), standby);
            }
            staged.push((name.to_string(), merged));
        }

        let mut events = Vec::new();
        for (name, merged) in staged {
            let record = self.devices.entry(name.clone()).or_insert_with(|| {
                debug!(device = %name, "device missing from zone list, adding it");
                DeviceRecord::new()
            });

            // records that have been merged before report field-level changes
            if record.contains(DEVICE_TYPE) {
                events.extend(diff_fields(record.fields(), &merged).into_iter().map(|c| {
                    Event::FieldChanged {
                        device: name.clone(),
                        field: c.path,
                        old: c.old,
                        new: c.new,
                    }
                }));
            }
            record.merge(merged);

            if let Some(event) = self.classify(&name) {
                events.push(event);
            }
        }

        debug!(devices = self.devices.len(), events = events.len(), "device state refreshed");
        Ok(events)
    }

    /// Register a handle kind the first time a supported type code is seen.
    /// An established kind is never revisited.
    fn classify(&mut self, name: &str) -> Option<Event> {
        if self.kinds.contains_key(name) {
            return None;
        }
        let code = self.devices.get(name)?.device_type();

        match code.and_then(DeviceKind::from_type_code) {
            Some(kind) => {
                self.unsupported.remove(name);
                self.kinds.insert(name.to_string(), kind);
                debug!(device = name, ?kind, "device classified");
                Some(Event::DeviceClassified {
                    name: name.to_string(),
                    kind,
                })
            }
            None => {
                if self.unsupported.insert(name.to_string()) {
                    match code {
                        Some(0) => debug!(device = name, "device type 0 (offline?), no handle"),
                        Some(code) => warn!(
                            device = name,
                            device_type = code,
                            "unsupported device type, only thermostats (1) and plugs (6) get handles"
                        ),
                        None => warn!(device = name, "device reported no DEVICE_TYPE"),
                    }
                }
                None
            }
        }
    }

    /// Apply fields confirmed by an accepted command. Returns the resulting
    /// changes; a device that is no longer cached is left alone.
    pub fn patch(&mut self, name: &str, fields: &[(&str, Value)]) -> Vec<Event> {
        let Some(record) = self.devices.get_mut(name) else {
            debug!(device = name, "patch for unknown device ignored");
            return Vec::new();
        };

        let mut events = Vec::new();
        for (field, value) in fields {
            let old = record.set(field, value.clone()).unwrap_or(Value::Null);
            if &old != value {
                events.push(Event::FieldChanged {
                    device: name.to_string(),
                    field: field.to_string(),
                    old,
                    new: value.clone(),
                });
            }
        }
        events
    }

    /// Move a record and its handle kind to a new name. Refused when `new`
    /// already names another device.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.devices.contains_key(old);
        }
        if self.devices.contains_key(new) {
            warn!(from = old, to = new, "rename target already cached, leaving both records for the next refresh");
            return false;
        }
        let Some(record) = self.devices.remove(old) else {
            return false;
        };
        self.devices.insert(new.to_string(), record);
        if let Some(kind) = self.kinds.remove(old) {
            self.kinds.insert(new.to_string(), kind);
        }
        if self.unsupported.remove(old) {
            self.unsupported.insert(new.to_string());
        }
        true
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.kinds.remove(name);
        self.unsupported.remove(name);
        self.devices.remove(name).is_some()
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_progress
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    pub fn snapshot(&self) -> Snapshot {
        self.devices.clone()
    }

    pub fn record(&self, name: &str) -> Option<&DeviceRecord> {
        self.devices.get(name)
    }

    pub fn kind(&self, name: &str) -> Option<DeviceKind> {
        self.kinds.get(name).copied()
    }

    /// Names of classified devices of `kind`, in name order.
    pub fn names_of(&self, kind: DeviceKind) -> Vec<String> {
        self.kinds
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn zones() -> Value {
        json!({"Kitchen": 1, "Lounge": 2})
    }

    fn info() -> Value {
        json!({"devices": [
            {"device": "Kitchen", "DEVICE_TYPE": 1, "CURRENT_TEMPERATURE": "21.5", "STANDBY": false},
            {"device": "Lounge", "DEVICE_TYPE": 6, "TIME_CLOCK_OVERIDE_BIT": true, "TIMER": false},
        ]})
    }

    fn engineers() -> Value {
        json!({
            "Kitchen": {"FROST TEMPERATURE": 12, "DEVICE_TYPE": 1},
            "Lounge": {"DEVICE_TYPE": 6},
        })
    }

    fn refreshed_cache() -> StateCache {
        let mut cache = StateCache::new(Duration::from_secs(15));
        cache.load_zones(&zones()).unwrap();
        assert!(cache.try_begin_refresh(false, Instant::now()));
        cache.complete_refresh(&info(), &engineers(), Instant::now()).unwrap();
        cache
    }

    #[test]
    fn zone_load_creates_id_only_records() {
        let mut cache = StateCache::new(Duration::from_secs(15));
        let zones = cache.load_zones(&zones()).unwrap();
        assert_eq!(zones.len(), 2);
        let kitchen = cache.record("Kitchen").unwrap();
        assert_eq!(kitchen.id(), Some(1));
        assert!(!kitchen.contains(FROST_ENABLED));
        assert_eq!(cache.zones(), zones);
    }

    #[test]
    fn zone_load_rejects_non_object() {
        let mut cache = StateCache::new(Duration::from_secs(15));
        let err = cache.load_zones(&json!(["Kitchen"])).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
    }

    #[test]
    fn merge_combines_both_queries() {
        let cache = refreshed_cache();
        let kitchen = cache.record("Kitchen").unwrap();
        assert_eq!(kitchen.get_f64("CURRENT_TEMPERATURE"), Some(21.5));
        assert_eq!(kitchen.get_f64("FROST TEMPERATURE"), Some(12.0));
        assert_eq!(kitchen.id(), Some(1));
        assert_eq!(kitchen.get_bool(FROST_ENABLED), Some(false));
    }

    #[test]
    fn engineering_fields_win_collisions() {
        let mut cache = StateCache::new(Duration::from_secs(15));
        cache.load_zones(&json!({"Kitchen": 1})).unwrap();
        cache.try_begin_refresh(true, Instant::now());
        cache
            .complete_refresh(
                &json!({"devices": [{"device": "Kitchen", "DEVICE_TYPE": 1, "HEATING": false}]}),
                &json!({"Kitchen": {"HEATING": true}}),
                Instant::now(),
            )
            .unwrap();
        assert_eq!(cache.record("Kitchen").unwrap().get_bool("HEATING"), Some(true));
    }

    #[test]
    fn classification_by_type_code() {
        let cache = refreshed_cache();
        assert_eq!(cache.kind("Kitchen"), Some(DeviceKind::Thermostat));
        assert_eq!(cache.kind("Lounge"), Some(DeviceKind::RelayPlug));
        assert_eq!(cache.names_of(DeviceKind::Thermostat), vec!["Kitchen".to_string()]);
    }

    #[test]
    fn unsupported_types_get_no_handle_but_keep_record() {
        let mut cache = StateCache::new(Duration::from_secs(15));
        cache.load_zones(&json!({"Offline": 1, "Sensor": 2})).unwrap();
        cache.try_begin_refresh(true, Instant::now());
        let events = cache
            .complete_refresh(
                &json!({"devices": [
                    {"device": "Offline", "DEVICE_TYPE": 0},
                    {"device": "Sensor", "DEVICE_TYPE": 3},
                ]}),
                &json!({}),
                Instant::now(),
            )
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(cache.kind("Offline"), None);
        assert_eq!(cache.kind("Sensor"), None);
        assert_eq!(cache.record("Sensor").unwrap().device_type(), Some(3));
    }

    #[test]
    fn classification_is_stable() {
        let mut cache = refreshed_cache();
        cache.try_begin_refresh(true, Instant::now());
        cache
            .complete_refresh(
                &json!({"devices": [{"device": "Kitchen", "DEVICE_TYPE": 6}]}),
                &json!({"Kitchen": {"DEVICE_TYPE": 6}}),
                Instant::now(),
            )
            .unwrap();
        assert_eq!(cache.kind("Kitchen"), Some(DeviceKind::Thermostat));
    }

    #[test]
    fn cache_hit_within_max_age() {
        let mut cache = refreshed_cache();
        assert!(!cache.try_begin_refresh(false, Instant::now()));
        assert!(cache.try_begin_refresh(true, Instant::now()));
    }

    #[test]
    fn age_expiry_makes_refresh_due() {
        let mut cache = StateCache::new(Duration::from_secs(15));
        cache.load_zones(&zones()).unwrap();
        let start = Instant::now();
        cache.try_begin_refresh(false, start);
        cache.complete_refresh(&info(), &engineers(), start).unwrap();

        assert!(!cache.is_due(false, start + Duration::from_secs(14)));
        assert!(cache.is_due(false, start + Duration::from_secs(15)));
    }

    #[test]
    fn dirty_forces_refresh() {
        let mut cache = refreshed_cache();
        cache.mark_dirty();
        assert!(cache.try_begin_refresh(false, Instant::now()));
        assert!(!cache.is_dirty());
    }

    #[test]
    fn concurrent_refresh_is_refused() {
        let mut cache = refreshed_cache();
        assert!(cache.try_begin_refresh(true, Instant::now()));
        assert!(cache.is_refreshing());
        assert!(!cache.try_begin_refresh(true, Instant::now()));
        cache.abort_refresh();
        assert!(!cache.is_refreshing());
        assert!(cache.is_dirty());
    }

    #[test]
    fn bad_info_leaves_records_and_retries() {
        let mut cache = refreshed_cache();
        let before = cache.snapshot();
        cache.try_begin_refresh(true, Instant::now());
        let err = cache
            .complete_refresh(&json!({"error": "busy"}), &engineers(), Instant::now())
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
        assert_eq!(cache.snapshot(), before);
        assert!(cache.is_dirty());
        assert!(!cache.is_refreshing());
    }

    #[test]
    fn refresh_reports_field_changes() {
        let mut cache = refreshed_cache();
        cache.try_begin_refresh(true, Instant::now());
        let events = cache
            .complete_refresh(
                &json!({"devices": [{"device": "Kitchen", "DEVICE_TYPE": 1, "CURRENT_TEMPERATURE": "22.0", "STANDBY": false}]}),
                &engineers(),
                Instant::now(),
            )
            .unwrap();
        assert_eq!(
            events,
            vec![Event::FieldChanged {
                device: "Kitchen".into(),
                field: "CURRENT_TEMPERATURE".into(),
                old: json!("21.5"),
                new: json!("22.0"),
            }]
        );
    }

    #[test]
    fn unlisted_device_is_added() {
        let mut cache = refreshed_cache();
        cache.try_begin_refresh(true, Instant::now());
        cache
            .complete_refresh(
                &json!({"devices": [{"device": "Attic", "DEVICE_TYPE": 1}]}),
                &json!({}),
                Instant::now(),
            )
            .unwrap();
        assert_eq!(cache.kind("Attic"), Some(DeviceKind::Thermostat));
    }

    #[test]
    fn patch_updates_in_place() {
        let mut cache = refreshed_cache();
        let events = cache.patch("Kitchen", &[(STANDBY, json!(true)), (FROST_ENABLED, json!(true))]);
        assert_eq!(events.len(), 2);
        assert_eq!(cache.record("Kitchen").unwrap().get_bool(STANDBY), Some(true));
        assert!(cache.patch("Nowhere", &[(STANDBY, json!(true))]).is_empty());
    }

    #[test]
    fn rename_and_remove() {
        let mut cache = refreshed_cache();
        assert!(cache.rename("Kitchen", "Galley"));
        assert!(cache.record("Kitchen").is_none());
        assert_eq!(cache.kind("Galley"), Some(DeviceKind::Thermostat));
        assert!(cache.remove("Galley"));
        assert!(cache.record("Galley").is_none());
        assert!(cache.names_of(DeviceKind::Thermostat).is_empty());
    }

    #[test]
    fn rename_onto_existing_device_is_refused() {
        let mut cache = refreshed_cache();
        let lounge = cache.record("Lounge").cloned();
        assert!(!cache.rename("Kitchen", "Lounge"));
        assert_eq!(cache.record("Lounge").cloned(), lounge);
        assert_eq!(cache.kind("Lounge"), Some(DeviceKind::RelayPlug));
        assert_eq!(cache.kind("Kitchen"), Some(DeviceKind::Thermostat));
        assert!(cache.rename("Kitchen", "Kitchen"));
    }
}
