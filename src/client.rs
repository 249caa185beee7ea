use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{DeviceRecord, Snapshot, StateCache};
use crate::config::HubConfig;
use crate::device::{DeviceKind, RelayPlug, Thermostat};
use crate::gateway::Gateway;
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{self, BoostInterval, Command, Target};
use crate::transport::Transport;
use crate::types::{Event, TemperatureUnit, Zone};
use crate::{Error, Result};

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;

pub struct NeoHubBuilder {
    config: HubConfig,
    event_callbacks: Vec<EventCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<PathBuf>,
}

impl NeoHubBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self::from_config(HubConfig::new(host))
    }

    pub fn from_config(config: HubConfig) -> Self {
        Self {
            config,
            event_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Maximum age of cached device state before `refresh(false)` goes back
    /// to the hub.
    pub fn cache_duration(mut self, duration: Duration) -> Self {
        self.config.cache_duration = duration;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<NeoHub> {
        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, path).map_err(Error::Log)?),
            _ => None,
        };

        let transport = Transport::new(self.config.host.clone(), self.config.port)
            .with_timeouts(self.config.connect_timeout, self.config.read_timeout);

        Ok(NeoHub {
            gateway: tokio::sync::Mutex::new(Gateway::new(transport, logger)),
            cache: Mutex::new(StateCache::new(self.config.cache_duration)),
            dcb: Mutex::new(None),
            config: self.config,
            event_callbacks: self.event_callbacks,
        })
    }
}

/// Client for one hub.
///
/// All methods take `&self`: requests are serialized internally, and the
/// device cache can be read while a request is in flight.
pub struct NeoHub {
    config: HubConfig,
    gateway: tokio::sync::Mutex<Gateway>,
    cache: Mutex<StateCache>,
    dcb: Mutex<Option<Value>>,
    event_callbacks: Vec<EventCallback>,
}

impl NeoHub {
    pub fn builder(host: impl Into<String>) -> NeoHubBuilder {
        NeoHubBuilder::new(host)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Connect, load the zone list and hub settings, then read all device
    /// state.
    pub async fn setup(&self) -> Result<()> {
        self.connect().await?;
        let zones = self.load_zones().await?;
        self.read_dcb().await?;
        self.refresh(true).await?;
        info!(
            zones = zones.len(),
            thermostats = self.thermostats().len(),
            plugs = self.relay_plugs().len(),
            "hub ready"
        );
        Ok(())
    }

    pub async fn connect(&self) -> Result<()> {
        self.gateway.lock().await.connect().await
    }

    pub async fn disconnect(&self) {
        self.gateway.lock().await.disconnect();
    }

    pub async fn is_connected(&self) -> bool {
        self.gateway.lock().await.is_connected()
    }

    /// Enumerate zones and reset the device records to one id-only record
    /// per zone.
    pub async fn load_zones(&self) -> Result<Vec<Zone>> {
        let reply = self.query(protocol::get_zones()).await?;
        self.cache().load_zones(&reply)
    }

    /// Read the hub's settings block.
    pub async fn read_dcb(&self) -> Result<Value> {
        let dcb = self.query(protocol::read_dcb()).await?;
        *lock(&self.dcb) = Some(dcb.clone());
        Ok(dcb)
    }

    /// Unit of the hub's temperatures, once [`NeoHub::read_dcb`] has run.
    pub fn temperature_unit(&self) -> Option<TemperatureUnit> {
        lock(&self.dcb)
            .as_ref()?
            .get("CORF")
            .and_then(Value::as_str)
            .and_then(TemperatureUnit::from_corf)
    }

    /// Current device state, re-read from the hub when forced, when a
    /// command has been sent since the last read, or when the cache is older
    /// than the configured duration.
    ///
    /// A call arriving while another refresh is running gets the current
    /// snapshot without waiting. Dropping the returned future part-way
    /// releases the refresh, so a later call queries the hub again.
    pub async fn refresh(&self, force: bool) -> Result<Snapshot> {
        {
            let mut cache = self.cache();
            if !cache.try_begin_refresh(force, Instant::now()) {
                return Ok(cache.snapshot());
            }
        }
        let pending = PendingRefresh { cache: &self.cache };

        debug!(force, "querying hub for device state");
        let replies = self.fetch_state().await;
        pending.disarm();

        let (events, snapshot) = {
            let mut cache = self.cache();
            let events = match replies {
                Ok((info, engineers)) => cache.complete_refresh(&info, &engineers, Instant::now())?,
                Err(e) => {
                    cache.abort_refresh();
                    return Err(e);
                }
            };
            (events, cache.snapshot())
        };
        self.emit(&events);
        Ok(snapshot)
    }

    async fn fetch_state(&self) -> Result<(Value, Value)> {
        let mut gateway = self.gateway.lock().await;
        let info = gateway.query(&protocol::info()).await?;
        let engineers = gateway.query(&protocol::engineers_data()).await?;
        Ok((info, engineers))
    }

    pub fn thermostats(&self) -> Vec<Thermostat<'_>> {
        self.cache()
            .names_of(DeviceKind::Thermostat)
            .into_iter()
            .map(|name| Thermostat::new(self, name))
            .collect()
    }

    pub fn relay_plugs(&self) -> Vec<RelayPlug<'_>> {
        self.cache()
            .names_of(DeviceKind::RelayPlug)
            .into_iter()
            .map(|name| RelayPlug::new(self, name))
            .collect()
    }

    pub fn thermostat(&self, name: &str) -> Option<Thermostat<'_>> {
        (self.cache().kind(name)? == DeviceKind::Thermostat)
            .then(|| Thermostat::new(self, name.to_string()))
    }

    pub fn relay_plug(&self, name: &str) -> Option<RelayPlug<'_>> {
        (self.cache().kind(name)? == DeviceKind::RelayPlug)
            .then(|| RelayPlug::new(self, name.to_string()))
    }

    /// Raw record for any known device, including unsupported types.
    pub fn device(&self, name: &str) -> Option<DeviceRecord> {
        self.cache().record(name).cloned()
    }

    pub fn devices(&self) -> Snapshot {
        self.cache().snapshot()
    }

    pub fn zones(&self) -> Vec<Zone> {
        self.cache().zones()
    }

    pub fn is_dirty(&self) -> bool {
        self.cache().is_dirty()
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.cache().last_refresh()
    }

    // -- Commands --

    /// Send an arbitrary JSON command and return the raw reply.
    pub async fn call(&self, payload: Value) -> Result<Value> {
        self.query(Command::raw(payload)).await
    }

    pub async fn firmware_version(&self) -> Result<String> {
        let reply = self.query(protocol::firmware()).await?;
        match reply.get("firmware version") {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(Error::Protocol(format!("FIRMWARE reply has no version: {reply}"))),
        }
    }

    /// Temperature history for the target, as returned by the hub.
    pub async fn temperature_log(&self, target: impl Into<Target>) -> Result<Value> {
        self.query(protocol::get_templog(&target.into())).await
    }

    pub async fn set_away_mode(&self, target: impl Into<Target>, on: bool) -> Result<bool> {
        self.execute(protocol::away(&target.into(), on)).await
    }

    pub async fn boost_on(&self, target: impl Into<Target>, interval: BoostInterval) -> Result<bool> {
        self.execute(protocol::boost(&target.into(), interval, true)).await
    }

    pub async fn boost_off(&self, target: impl Into<Target>, interval: BoostInterval) -> Result<bool> {
        self.execute(protocol::boost(&target.into(), interval, false)).await
    }

    pub async fn frost_on(&self, target: impl Into<Target>) -> Result<bool> {
        self.execute(protocol::frost(&target.into(), true)).await
    }

    pub async fn frost_off(&self, target: impl Into<Target>) -> Result<bool> {
        self.execute(protocol::frost(&target.into(), false)).await
    }

    /// Set the frost (minimum) temperature.
    pub async fn set_frost(&self, target: impl Into<Target>, temp: i32) -> Result<bool> {
        self.execute(protocol::set_frost(&target.into(), temp)).await
    }

    pub async fn set_preheat(&self, target: impl Into<Target>, temp: i32) -> Result<bool> {
        self.execute(protocol::set_preheat(&target.into(), temp)).await
    }

    pub async fn set_temp(&self, target: impl Into<Target>, temp: i32) -> Result<bool> {
        self.execute(protocol::set_temp(&target.into(), temp)).await
    }

    pub async fn create_group(&self, devices: &[String], name: &str) -> Result<bool> {
        self.execute(protocol::create_group(devices, name)).await
    }

    pub async fn delete_group(&self, name: &str) -> Result<bool> {
        self.execute(protocol::delete_group(name)).await
    }

    pub async fn switch_plug_on(&self, target: impl Into<Target>) -> Result<bool> {
        self.execute(protocol::timer(&target.into(), true)).await
    }

    pub async fn switch_plug_off(&self, target: impl Into<Target>) -> Result<bool> {
        self.execute(protocol::timer(&target.into(), false)).await
    }

    /// Rename a zone. On success the cached record and any handle kind move
    /// to the new name.
    pub async fn zone_title(&self, old_name: &str, new_name: &str) -> Result<bool> {
        if !self.execute(protocol::zone_title(old_name, new_name)).await? {
            return Ok(false);
        }
        if self.cache().rename(old_name, new_name) {
            self.emit(&[Event::ZoneRenamed {
                old: old_name.to_string(),
                new: new_name.to_string(),
            }]);
        }
        Ok(true)
    }

    /// Remove zones from the hub. On success their records are dropped;
    /// a group target is left for the next refresh to sort out.
    pub async fn remove_zone(&self, target: impl Into<Target>) -> Result<bool> {
        let target = target.into();
        if !self.execute(protocol::remove_zone(&target)).await? {
            return Ok(false);
        }
        let removed: Vec<Event> = {
            let mut cache = self.cache();
            target
                .device_names()
                .iter()
                .filter(|name| cache.remove(name))
                .map(|name| Event::ZoneRemoved { name: name.clone() })
                .collect()
        };
        self.emit(&removed);
        Ok(true)
    }

    // -- Plumbing shared with the device handles --

    /// Run a command for one device and, if the hub accepts it, write the
    /// given fields into its record instead of re-reading everything.
    pub(crate) async fn mutate(&self, name: &str, command: Command, patch: &[(&str, Value)]) -> Result<bool> {
        if !self.execute(command).await? {
            return Ok(false);
        }
        let events = self.cache().patch(name, patch);
        self.emit(&events);
        Ok(true)
    }

    pub(crate) fn read_record<T>(&self, name: &str, f: impl FnOnce(&DeviceRecord) -> Option<T>) -> Option<T> {
        self.cache().record(name).and_then(f)
    }

    async fn query(&self, command: Command) -> Result<Value> {
        self.note_command(&command);
        let reply = self.gateway.lock().await.query(&command).await;
        self.note_command(&command);
        reply
    }

    async fn execute(&self, command: Command) -> Result<bool> {
        self.note_command(&command);
        let accepted = self.gateway.lock().await.execute(&command).await;
        self.note_command(&command);
        accepted
    }

    /// Marks the cache dirty for mutating commands. Called on both sides of
    /// the request: before, in case the caller never sees it finish, and
    /// after, since a refresh that ran meanwhile may have cleared the flag.
    fn note_command(&self, command: &Command) {
        if command.is_mutating() {
            self.cache().mark_dirty();
        }
    }

    fn emit(&self, events: &[Event]) {
        for event in events {
            for cb in &self.event_callbacks {
                cb(event);
            }
        }
    }

    fn cache(&self) -> MutexGuard<'_, StateCache> {
        lock(&self.cache)
    }
}

/// Claim on the cache's refresh slot. Dropped before [`PendingRefresh::disarm`],
/// e.g. when the refresh future is cancelled, it aborts the refresh.
struct PendingRefresh<'a> {
    cache: &'a Mutex<StateCache>,
}

impl PendingRefresh<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for PendingRefresh<'_> {
    fn drop(&mut self) {
        debug!("refresh abandoned before completion");
        lock(self.cache).abort_refresh();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("recovering poisoned lock");
        PoisonError::into_inner(poisoned)
    })
}
