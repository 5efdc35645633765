//! User → timezone mapping backed by the shared data store.
//!
//! The mapping lives under one key as a JSON object. It is loaded once in the
//! background; until then every lookup answers "unknown". The load replaces
//! the cache wholesale.

use crate::plugin::datastore::{get_typed, set_typed};
use crate::plugin::DataStore;
use crate::plugins::timezones::format::{parse_timezone, TimezoneError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DATASTORE_KEY: &str = "vencord-timezones";

/// User id → IANA zone name. `None` marks an explicitly cleared entry.
pub type TimezoneMap = HashMap<String, Option<String>>;

pub struct TimezoneStore {
    datastore: Arc<dyn DataStore>,
    cache: RwLock<TimezoneMap>,
    ready: watch::Sender<bool>,
}

impl std::fmt::Debug for TimezoneStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimezoneStore")
            .field("entries", &self.cache.read().len())
            .field("ready", &*self.ready.borrow())
            .finish()
    }
}

impl TimezoneStore {
    pub fn new(datastore: Arc<dyn DataStore>) -> Arc<Self> {
        let (ready, _) = watch::channel(false);
        Arc::new(Self {
            datastore,
            cache: RwLock::new(HashMap::new()),
            ready,
        })
    }

    /// Read the mapping from the data store and mark the store ready.
    ///
    /// A failed read leaves the mapping empty but still marks the store ready.
    pub fn load(&self) -> Result<(), TimezoneError> {
        // Held across the read so a concurrent `set` cannot land in between
        let mut cache = self.cache.write();
        let loaded: Result<Option<TimezoneMap>, _> =
            get_typed(self.datastore.as_ref(), DATASTORE_KEY);

        let (map, result) = match loaded {
            Ok(map) => (map.unwrap_or_default(), Ok(())),
            Err(e) => (TimezoneMap::new(), Err(TimezoneError::from(e))),
        };

        debug!(entries = map.len(), "timezones loaded");
        *cache = map;
        self.ready.send_replace(true);
        result
    }

    /// Load on a blocking task of the current tokio runtime, or inline when
    /// there is none.
    pub fn spawn_load(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let store = Arc::clone(self);
        let run = move || {
            if let Err(e) = store.load() {
                warn!("failed to load timezones: {e}");
            }
        };

        match Handle::try_current() {
            Ok(handle) => Some(handle.spawn_blocking(run)),
            Err(_) => {
                run();
                None
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the initial load has finished.
    pub async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so this only ends once ready
        let _ = rx.wait_for(|ready| *ready).await;
    }

    pub fn get(&self, user_id: &str) -> Option<String> {
        self.cache.read().get(user_id).cloned().flatten()
    }

    /// Set or clear a user's timezone and persist the whole mapping.
    ///
    /// Before the initial load has finished the persisted mapping is merged
    /// in first, so entries not yet in the cache are kept.
    pub fn set(&self, user_id: &str, timezone: Option<&str>) -> Result<(), TimezoneError> {
        let timezone = timezone
            .map(|name| parse_timezone(name).map(|tz| tz.name().to_string()))
            .transpose()?;

        // Persist under the lock so a concurrent load sees this write
        let mut cache = self.cache.write();
        if !self.is_ready() {
            let persisted: Option<TimezoneMap> =
                get_typed(self.datastore.as_ref(), DATASTORE_KEY)?;
            for (user, tz) in persisted.unwrap_or_default() {
                cache.entry(user).or_insert(tz);
            }
        }
        cache.insert(user_id.to_string(), timezone);
        set_typed(self.datastore.as_ref(), DATASTORE_KEY, &*cache)?;
        Ok(())
    }

    /// Every entry, sorted by user id.
    pub fn entries(&self) -> BTreeMap<String, Option<String>> {
        self.cache
            .read()
            .iter()
            .map(|(user, tz)| (user.clone(), tz.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_reads_before_load_are_unknown() {
        let datastore = Arc::new(MemoryStore::new());
        datastore
            .set(DATASTORE_KEY, json!({"42": "Europe/Berlin"}))
            .unwrap();

        let store = TimezoneStore::new(datastore);
        assert!(!store.is_ready());
        assert_eq!(store.get("42"), None);

        store.load().unwrap();
        assert!(store.is_ready());
        assert_eq!(store.get("42").as_deref(), Some("Europe/Berlin"));
    }

    #[test]
    fn test_set_validates_and_persists() {
        let datastore = Arc::new(MemoryStore::new());
        let store = TimezoneStore::new(datastore.clone());
        store.load().unwrap();

        assert!(matches!(
            store.set("42", Some("Nowhere/Special")),
            Err(TimezoneError::UnknownTimezone(_))
        ));

        store.set("42", Some("Asia/Tokyo")).unwrap();
        store.set("7", None).unwrap();
        assert_eq!(store.get("42").as_deref(), Some("Asia/Tokyo"));
        assert_eq!(store.get("7"), None);
        assert_eq!(
            datastore.get(DATASTORE_KEY).unwrap(),
            Some(json!({"42": "Asia/Tokyo", "7": null}))
        );
    }

    #[test]
    fn test_set_before_load_keeps_persisted_entries() {
        let datastore = Arc::new(MemoryStore::new());
        datastore
            .set(
                DATASTORE_KEY,
                json!({"1": "Europe/Berlin", "2": "Asia/Tokyo"}),
            )
            .unwrap();

        let store = TimezoneStore::new(datastore.clone());
        store.set("3", Some("UTC")).unwrap();
        assert_eq!(
            datastore.get(DATASTORE_KEY).unwrap(),
            Some(json!({"1": "Europe/Berlin", "2": "Asia/Tokyo", "3": "UTC"}))
        );

        store.load().unwrap();
        assert_eq!(store.get("1").as_deref(), Some("Europe/Berlin"));
        assert_eq!(store.get("2").as_deref(), Some("Asia/Tokyo"));
        assert_eq!(store.get("3").as_deref(), Some("UTC"));
    }

    #[test]
    fn test_corrupt_mapping_still_becomes_ready() {
        let datastore = Arc::new(MemoryStore::new());
        datastore.set(DATASTORE_KEY, json!([1, 2, 3])).unwrap();

        let store = TimezoneStore::new(datastore);
        assert!(store.load().is_err());
        assert!(store.is_ready());
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_spawn_load_without_runtime_runs_inline() {
        let store = TimezoneStore::new(Arc::new(MemoryStore::new()));
        assert!(store.spawn_load().is_none());
        assert!(store.is_ready());
    }

    #[tokio::test]
    async fn test_ready_signal() {
        let datastore = Arc::new(MemoryStore::new());
        datastore.set(DATASTORE_KEY, json!({"1": "UTC"})).unwrap();

        let store = TimezoneStore::new(datastore);
        let handle = store.spawn_load();
        assert!(handle.is_some());

        store.ready().await;
        assert_eq!(store.get("1").as_deref(), Some("UTC"));
    }
}
