use std::collections::HashMap;

/// Storage key of the persisted on/off toggle. The value is a JSON boolean.
pub const ENABLED_KEY: &str = "pagevirt_enabled";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key/value store unavailable: {0}")]
    Unavailable(String),

    #[error("stored value is not a JSON boolean: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A persistent string key/value store surviving page reloads.
pub trait FlagStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory [`FlagStore`]. Can be switched to fail every call.
#[derive(Clone, Debug, Default)]
pub struct MemoryFlagStore {
    values: HashMap<String, String>,
    failing: bool,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.failing {
            return Err(StoreError::Unavailable("read refused".into()));
        }
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.failing {
            return Err(StoreError::Unavailable("write refused".into()));
        }
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

fn read_flag<S: FlagStore + ?Sized>(store: &S) -> Result<Option<bool>, StoreError> {
    let Some(raw) = store.get(ENABLED_KEY)? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_str(&raw)?))
}

/// Reads the persisted toggle. Any failure is logged and treated as "not set".
pub fn load_enabled<S: FlagStore + ?Sized>(store: &S) -> Option<bool> {
    match read_flag(store) {
        Ok(value) => value,
        Err(_err) => {
            awarn!(error = %_err, "load_enabled: ignoring persisted toggle");
            None
        }
    }
}

/// Persists the toggle. Returns `false` (after logging) when the store rejected the write.
pub fn save_enabled<S: FlagStore + ?Sized>(store: &mut S, enabled: bool) -> bool {
    let result = serde_json::to_string(&enabled)
        .map_err(StoreError::from)
        .and_then(|raw| store.set(ENABLED_KEY, &raw));
    match result {
        Ok(()) => true,
        Err(_err) => {
            awarn!(error = %_err, enabled, "save_enabled: toggle not persisted");
            false
        }
    }
}
