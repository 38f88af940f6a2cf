use std::collections::HashMap;

use crate::observer::{ObserverList, SubscriptionId};

/// Well-known setting keys.
pub mod keys {
    pub const TRACKING_ENABLED: &str = "tracking_enabled";
    pub const POWER_SAVE: &str = "power_save";
    pub const AUTO_WAYPOINT: &str = "auto_waypoint";
    pub const SPEED_UNIT: &str = "speed_unit";
    pub const ALTITUDE_UNIT: &str = "altitude_unit";
    pub const LOCATION_UNIT: &str = "location_unit";
    pub const BEARING_UNIT: &str = "bearing_unit";
}

pub type SettingCallback = Box<dyn FnMut(&str) + Send>;

/// String key/value settings with change notification.
///
/// Passed explicitly to whatever needs it; there is no global instance.
pub trait SettingsStore {
    /// Stored value, falling back to the store's default for `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` and notify subscribers of `key`.
    fn set(&mut self, key: &str, value: &str);

    /// Subscribe to changes of `key`. The callback first receives the current
    /// value, if there is one, before `subscribe` returns.
    fn subscribe(&mut self, key: &str, callback: SettingCallback) -> SubscriptionId;

    /// Returns `false` if the subscription was already removed.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    fn is_set(&self, key: &str) -> bool {
        self.get(key).as_deref() == Some("true")
    }
}

/// Defaults for the well-known keys.
pub fn default_settings() -> HashMap<String, String> {
    [
        (keys::TRACKING_ENABLED, "false"),
        (keys::POWER_SAVE, "false"),
        (keys::AUTO_WAYPOINT, "false"),
        (keys::SPEED_UNIT, "km_per_h"),
        (keys::ALTITUDE_UNIT, "m"),
        (keys::LOCATION_UNIT, "dms"),
        (keys::BEARING_UNIT, "deg"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// In-memory settings store.
pub struct MemorySettings {
    values: HashMap<String, String>,
    defaults: HashMap<String, String>,
    listeners: ObserverList<(String, SettingCallback)>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::with_defaults(default_settings())
    }
}

impl MemorySettings {
    pub fn with_defaults(defaults: HashMap<String, String>) -> Self {
        Self {
            values: HashMap::new(),
            defaults,
            listeners: ObserverList::default(),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .or_else(|| self.defaults.get(key))
            .cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
        tracing::debug!(key, value, "setting changed");
        for (listen_key, callback) in self.listeners.iter_mut() {
            if listen_key.as_str() == key {
                callback(value);
            }
        }
    }

    fn subscribe(&mut self, key: &str, callback: SettingCallback) -> SubscriptionId {
        let current = self.get(key);
        let id = self.listeners.add((key.to_string(), callback));
        if let (Some(value), Some((_, callback))) = (current, self.listeners.get_mut(id)) {
            callback(&value);
        }
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }
}
