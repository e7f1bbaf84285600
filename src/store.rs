use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::warn;

/// Storage keys for everything a session needs to survive a restart.
///
/// The names are part of the persisted contract — changing them orphans
/// sessions saved by earlier builds.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "tms_auth_token";
    pub const SESSION_TOKEN: &str = "tms_session_token";
    pub const REFRESH_TOKEN: &str = "tms_refresh_token";
    pub const ACCESS_EXPIRY: &str = "tms_token_expiry";
    pub const REFRESH_EXPIRY: &str = "tms_refresh_expiry";
    pub const LOGIN_TIMESTAMP: &str = "tms_login_at";
    pub const USER_DATA: &str = "tms_user_data";
    pub const SELECTED_COMPANY: &str = "tms_selected_empresa";
    pub const COMPANY_LIST: &str = "tms_empresas_list";
    pub const WARNING_INFO: &str = "tms_warn_info_at";
    pub const WARNING_WARNING: &str = "tms_warn_warning_at";
    pub const WARNING_CRITICAL: &str = "tms_warn_critical_at";

    /// Every session-scoped key, in clear-on-logout order.
    pub const ALL: &[&str] = &[
        ACCESS_TOKEN,
        SESSION_TOKEN,
        REFRESH_TOKEN,
        ACCESS_EXPIRY,
        REFRESH_EXPIRY,
        LOGIN_TIMESTAMP,
        USER_DATA,
        SELECTED_COMPANY,
        COMPANY_LIST,
        WARNING_INFO,
        WARNING_WARNING,
        WARNING_CRITICAL,
    ];
}

/// Durable key/value storage for session state.
///
/// Implementations never panic and never fail loudly: a missing key is a
/// normal outcome, and a write that cannot be persisted degrades to an
/// in-memory value. All expiry logic lives above this layer — the store is
/// dumb on purpose.
pub trait SessionStore: Send + Sync + 'static {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Removes every session-scoped key.
pub fn clear_session_keys(store: &dyn SessionStore) {
    for key in keys::ALL {
        store.remove(key);
    }
}

/// Reads a key persisted as unix milliseconds.
pub(crate) fn read_millis(store: &dyn SessionStore, key: &str) -> Option<i64> {
    store.read(key)?.parse().ok()
}

// ── In-memory store ────────────────────────────────────────────────

/// Purely in-memory [`SessionStore`].
///
/// The stand-in for environments without durable storage — sessions last
/// for the lifetime of the process. Also convenient in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn read(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_owned(), value.to_owned());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(key);
        }
    }
}

// ── File-backed store ──────────────────────────────────────────────

/// [`SessionStore`] persisted to a single JSON file.
///
/// Lets a desktop shell survive restarts the way a browser app survives
/// reloads. An unreadable or corrupt file degrades to an empty store; a
/// failed write keeps the in-memory value and logs the problem.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`, loading any previously saved values.
    #[must_use]
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
                Ok(values) => values,
                Err(error) => {
                    warn!(path = %path.display(), %error, "session file corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, values: RwLock::new(values) }
    }

    fn persist(&self, values: &BTreeMap<String, String>) {
        let bytes = match serde_json::to_vec_pretty(values) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "could not serialize session file");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(error) = std::fs::write(&self.path, bytes) {
            warn!(path = %self.path.display(), %error, "could not write session file");
        }
    }
}

impl SessionStore for FileStore {
    fn read(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_owned(), value.to_owned());
            self.persist(&values);
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.write() {
            if values.remove(key).is_some() {
                self.persist(&values);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.read(keys::ACCESS_TOKEN), None);

        store.write(keys::ACCESS_TOKEN, "T1");
        assert_eq!(store.read(keys::ACCESS_TOKEN), Some("T1".into()));

        store.remove(keys::ACCESS_TOKEN);
        assert_eq!(store.read(keys::ACCESS_TOKEN), None);
        // removing again is fine
        store.remove(keys::ACCESS_TOKEN);
    }

    #[test]
    fn clear_session_keys_empties_everything() {
        let store = MemoryStore::new();
        for key in keys::ALL {
            store.write(key, "x");
        }
        clear_session_keys(&store);
        for key in keys::ALL {
            assert_eq!(store.read(key), None, "{key} survived clear");
        }
    }

    #[test]
    fn read_millis_parses_or_none() {
        let store = MemoryStore::new();
        store.write(keys::ACCESS_EXPIRY, "1700000000000");
        assert_eq!(read_millis(&store, keys::ACCESS_EXPIRY), Some(1_700_000_000_000));

        store.write(keys::ACCESS_EXPIRY, "not a number");
        assert_eq!(read_millis(&store, keys::ACCESS_EXPIRY), None);
        assert_eq!(read_millis(&store, keys::REFRESH_EXPIRY), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(&path);
        store.write(keys::ACCESS_TOKEN, "T1");
        store.write(keys::USER_DATA, r#"{"userId":1}"#);
        drop(store);

        let reopened = FileStore::open(&path);
        assert_eq!(reopened.read(keys::ACCESS_TOKEN), Some("T1".into()));
        assert_eq!(reopened.read(keys::USER_DATA), Some(r#"{"userId":1}"#.into()));
    }

    #[test]
    fn file_store_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileStore::open(&path);
        assert_eq!(store.read(keys::ACCESS_TOKEN), None);
        // still writable afterwards
        store.write(keys::ACCESS_TOKEN, "T1");
        assert_eq!(store.read(keys::ACCESS_TOKEN), Some("T1".into()));
    }
}
