//! Shared Reading Store
//!
//! Latest decoded value per polled parameter plus the VIN, behind a single
//! mutex. The poll task writes; consumers drain with [`ReadingStore::read_and_reset`].
//! No lock is ever held across an `.await`.

use obd_protocol::{Parameter, Reading, Vin, NO_READING, VIN_KEY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Lifecycle of the adapter connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Initializing,
    Polling,
    /// Terminal
    Failed,
}

impl ConnectionState {
    /// Whether the transport session is held and snapshots are served
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Initializing | ConnectionState::Polling)
    }
}

/// Copy of the store taken by a drain-read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// One entry per polled parameter, in sweep order
    readings: Vec<(&'static str, Reading)>,
    vin: Option<Vin>,
}

impl Snapshot {
    /// Reading for `key`, `None` if the key is not polled
    pub fn get(&self, key: &str) -> Option<Reading> {
        self.readings
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, reading)| *reading)
    }

    pub fn vin(&self) -> Option<&Vin> {
        self.vin.as_ref()
    }

    pub fn readings(&self) -> impl Iterator<Item = (&'static str, Reading)> + '_ {
        self.readings.iter().copied()
    }

    /// String map as shown to display layers: `-255` for no reading,
    /// `ERROR` for unsupported, `vin` always present
    pub fn to_legacy_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = self
            .readings
            .iter()
            .map(|(key, reading)| (key.to_string(), reading.to_string()))
            .collect();
        let vin = self
            .vin
            .as_ref()
            .map_or_else(|| NO_READING.to_string(), Vin::to_string);
        map.insert(VIN_KEY.to_string(), vin);
        map
    }
}

struct Inner {
    state: ConnectionState,
    readings: Vec<(&'static str, Reading)>,
    vin: Option<Vin>,
}

/// Thread-safe store of live readings
pub struct ReadingStore {
    inner: Mutex<Inner>,
}

impl ReadingStore {
    /// Create a store with every parameter key set to "no reading"
    pub fn new(parameters: &[Parameter]) -> Self {
        let readings = parameters
            .iter()
            .map(|param| (param.key, Reading::NoReading))
            .collect();

        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                readings,
                vin: None,
            }),
        }
    }

    // Every critical section leaves `Inner` consistent, so a poisoned lock
    // is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `reading` under `key`. Returns `false` for keys that are not polled.
    pub fn write(&self, key: &str, reading: Reading) -> bool {
        let mut inner = self.lock();
        match inner.readings.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => {
                slot.1 = reading;
                true
            }
            None => {
                warn!("Ignoring reading for unknown key {:?}", key);
                false
            }
        }
    }

    pub fn write_vin(&self, vin: Vin) {
        self.lock().vin = Some(vin);
    }

    /// Copy every value, then reset all keys but the VIN to "no reading"
    ///
    /// Returns `None` when no transport session is held.
    pub fn read_and_reset(&self) -> Option<Snapshot> {
        let mut inner = self.lock();
        if !inner.state.is_connected() {
            return None;
        }

        let snapshot = Snapshot {
            readings: inner.readings.clone(),
            vin: inner.vin.clone(),
        };
        for (_, reading) in inner.readings.iter_mut() {
            *reading = Reading::NoReading;
        }
        Some(snapshot)
    }

    /// Drop the VIN and reset every reading to "no reading"
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.vin = None;
        for (_, reading) in inner.readings.iter_mut() {
            *reading = Reading::NoReading;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Move to `state`. Once `Failed`, the state never changes again.
    pub fn set_state(&self, state: ConnectionState) {
        let mut inner = self.lock();
        if inner.state == state {
            return;
        }
        if inner.state == ConnectionState::Failed {
            debug!("Ignoring transition to {:?}: session already failed", state);
            return;
        }
        info!("Connection state {:?} -> {:?}", inner.state, state);
        inner.state = state;
    }
}
