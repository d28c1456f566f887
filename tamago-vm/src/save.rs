//! Save-data persistence
//!
//! All programs share one record in the [`Store`], a JSON object mapping each
//! program name to the bytes of its save window.
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Key under which the save record is kept
pub const SAVE_RECORD_KEY: &str = "tamago.save";

/// Durable key-value store used by `SAVE` and `LOAD`
pub trait Store {
    /// Reads the value stored under `key`
    fn get(&self, key: &str) -> Option<String>;

    /// Replaces the value stored under `key`
    fn set(&mut self, key: &str, value: String);
}

/// Store which keeps nothing
pub struct EmptyStore;
impl Store for EmptyStore {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }
    fn set(&mut self, _key: &str, _value: String) {
        // nothing to do here
    }
}

impl Store for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_owned(), value);
    }
}

/// Save data for every program, keyed by program name
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaveRecord(BTreeMap<String, Vec<u8>>);

impl SaveRecord {
    /// Reads the record from a store
    ///
    /// A missing or malformed record reads as empty.  Entries are decoded one
    /// at a time, so a malformed entry only drops that program's save.
    pub fn read(store: &dyn Store) -> Self {
        let Some(raw) = store.get(SAVE_RECORD_KEY) else {
            return Self::default();
        };
        let entries: BTreeMap<String, serde_json::Value> =
            match serde_json::from_str(&raw) {
                Ok(r) => r,
                Err(e) => {
                    warn!("ignoring malformed save record: {e}");
                    return Self::default();
                }
            };
        let mut out = Self::default();
        for (name, value) in entries {
            match serde_json::from_value::<Vec<u8>>(value) {
                Ok(data) => {
                    out.0.insert(name, data);
                }
                Err(e) => warn!("ignoring malformed save for {name:?}: {e}"),
            }
        }
        out
    }

    /// Writes the record back to a store
    pub fn write(&self, store: &mut dyn Store) {
        match serde_json::to_string(self) {
            Ok(s) => store.set(SAVE_RECORD_KEY, s),
            Err(e) => warn!("could not serialize save record: {e}"),
        }
    }

    /// Returns the saved bytes for a program
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// Stores the bytes for a program, replacing any previous save
    pub fn insert(&mut self, name: &str, data: &[u8]) {
        self.0.insert(name.to_owned(), data.to_vec());
    }
}
