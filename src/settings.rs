use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

pub const SETTINGS_KEY: &str = "clarity_settings";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid export data")]
    InvalidExport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureKey {
    CleanMode,
    RemoveReels,
    RemoveSponsored,
    RemoveSuggested,
    RemoveMarketplace,
    RemoveSearchAds,
    RemovePeopleYouMayKnow,
    RemoveGroupSuggestions,
    RemoveStories,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub clean_mode: bool,
    #[serde(default = "enabled")]
    pub remove_reels: bool,
    #[serde(default = "enabled")]
    pub remove_sponsored: bool,
    #[serde(default = "enabled")]
    pub remove_suggested: bool,
    #[serde(default = "enabled")]
    pub remove_marketplace: bool,
    #[serde(default = "enabled")]
    pub remove_search_ads: bool,
    #[serde(default = "enabled")]
    pub remove_people_you_may_know: bool,
    #[serde(default = "enabled")]
    pub remove_group_suggestions: bool,
    #[serde(default = "enabled")]
    pub remove_stories: bool,
    #[serde(default = "now_millis")]
    pub last_updated: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            clean_mode: false,
            remove_reels: true,
            remove_sponsored: true,
            remove_suggested: true,
            remove_marketplace: true,
            remove_search_ads: true,
            remove_people_you_may_know: true,
            remove_group_suggestions: true,
            remove_stories: true,
            last_updated: now_millis(),
        }
    }
}

fn enabled() -> bool {
    true
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Settings {
    pub fn get(&self, key: FeatureKey) -> bool {
        match key {
            FeatureKey::CleanMode => self.clean_mode,
            FeatureKey::RemoveReels => self.remove_reels,
            FeatureKey::RemoveSponsored => self.remove_sponsored,
            FeatureKey::RemoveSuggested => self.remove_suggested,
            FeatureKey::RemoveMarketplace => self.remove_marketplace,
            FeatureKey::RemoveSearchAds => self.remove_search_ads,
            FeatureKey::RemovePeopleYouMayKnow => self.remove_people_you_may_know,
            FeatureKey::RemoveGroupSuggestions => self.remove_group_suggestions,
            FeatureKey::RemoveStories => self.remove_stories,
        }
    }

    pub fn set(&mut self, key: FeatureKey, value: bool) {
        match key {
            FeatureKey::CleanMode => self.set_clean_mode(value),
            FeatureKey::RemoveReels => self.remove_reels = value,
            FeatureKey::RemoveSponsored => self.remove_sponsored = value,
            FeatureKey::RemoveSuggested => self.remove_suggested = value,
            FeatureKey::RemoveMarketplace => self.remove_marketplace = value,
            FeatureKey::RemoveSearchAds => self.remove_search_ads = value,
            FeatureKey::RemovePeopleYouMayKnow => self.remove_people_you_may_know = value,
            FeatureKey::RemoveGroupSuggestions => self.remove_group_suggestions = value,
            FeatureKey::RemoveStories => self.remove_stories = value,
        }
    }

    /// Master switch: flips every removal flag along with the mode itself.
    pub fn set_clean_mode(&mut self, on: bool) {
        self.clean_mode = on;
        self.remove_reels = on;
        self.remove_sponsored = on;
        self.remove_suggested = on;
        self.remove_marketplace = on;
        self.remove_search_ads = on;
        self.remove_people_you_may_know = on;
        self.remove_group_suggestions = on;
        self.remove_stories = on;
    }

    /// Parses a stored or imported document, filling missing keys with defaults.
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).context("settings: decode")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub version: String,
    pub export_date: i64,
    pub settings: Settings,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

/// Key-value settings storage with change notification.
#[derive(Clone)]
pub struct SettingsStore {
    conn: Arc<Mutex<Connection>>,
    subscribers: Arc<Mutex<Vec<Sender<Settings>>>>,
}

impl SettingsStore {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("settings: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("settings: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("settings: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("settings: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("settings: set busy timeout")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("settings: open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn try_load(&self) -> Result<Option<Settings>> {
        let raw: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()
            .context("settings: query")?
        };
        let Some(raw) = raw else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(&raw).context("settings: parse stored json")?;
        Settings::from_json(value).map(Some)
    }

    /// Current settings. First use persists the defaults; any storage failure
    /// degrades to defaults.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                debug!("no stored settings, saving defaults");
                self.save(Settings::default()).unwrap_or_else(|err| {
                    warn!(error = %err, "failed to persist default settings");
                    Settings::default()
                })
            }
            Err(err) => {
                warn!(error = %err, "failed to load settings, using defaults");
                Settings::default()
            }
        }
    }

    pub fn save(&self, mut settings: Settings) -> Result<Settings> {
        settings.last_updated = now_millis();
        let raw = serde_json::to_string(&settings).context("settings: encode")?;
        {
            let conn = self.conn.lock();
            conn.execute(
                r#"
INSERT INTO kv (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
                params![SETTINGS_KEY, raw, settings.last_updated],
            )
            .context("settings: write")?;
        }
        self.notify(&settings);
        Ok(settings)
    }

    pub fn update(&self, key: FeatureKey, value: bool) -> Result<Settings> {
        let mut settings = self.load();
        settings.set(key, value);
        self.save(settings)
    }

    pub fn reset(&self) -> Result<Settings> {
        self.save(Settings::default())
    }

    pub fn export(&self) -> ExportData {
        ExportData {
            version: crate::VERSION.to_string(),
            export_date: now_millis(),
            settings: self.load(),
        }
    }

    /// Accepts a previously exported document; missing setting keys take
    /// their defaults.
    pub fn import(&self, data: &str) -> Result<Settings> {
        let value: Value = serde_json::from_str(data).context("settings: parse import")?;
        let settings = match value.get("settings") {
            Some(settings @ Value::Object(_)) => Settings::from_json(settings.clone())?,
            _ => return Err(SettingsError::InvalidExport.into()),
        };
        self.save(settings)
    }

    pub fn subscribe(&self) -> Receiver<Settings> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn notify(&self, settings: &Settings) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(settings.clone()).is_ok());
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations().iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![
                version,
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_secs() as i64,
            ],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("feed-clarity").join("settings.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_keys_take_defaults() {
        let settings = Settings::from_json(json!({ "removeSponsored": false })).unwrap();
        assert!(!settings.remove_sponsored);
        assert!(settings.remove_reels);
        assert!(settings.remove_stories);
        assert!(!settings.clean_mode);
    }

    #[test]
    fn first_load_persists_defaults() {
        let store = SettingsStore::open_in_memory().unwrap();
        assert!(store.try_load().unwrap().is_none());
        let settings = store.load();
        assert!(settings.remove_sponsored);
        assert!(store.try_load().unwrap().is_some());
    }

    #[test]
    fn update_persists_and_notifies() {
        let store = SettingsStore::open_in_memory().unwrap();
        let rx = store.subscribe();
        store
            .update(FeatureKey::RemoveSponsored, false)
            .unwrap();
        let stored = store.load();
        assert!(!stored.remove_sponsored);
        let notified: Vec<Settings> = rx.try_iter().collect();
        assert!(notified.iter().any(|s| !s.remove_sponsored));
    }

    #[test]
    fn clean_mode_toggles_everything() {
        let mut settings = Settings::default();
        settings.set(FeatureKey::CleanMode, false);
        assert!(!settings.remove_reels);
        assert!(!settings.remove_group_suggestions);
        settings.set(FeatureKey::CleanMode, true);
        assert!(settings.get(FeatureKey::RemoveStories));
        assert!(settings.get(FeatureKey::CleanMode));
    }

    #[test]
    fn export_then_import_keeps_flags() {
        let store = SettingsStore::open_in_memory().unwrap();
        store.update(FeatureKey::RemoveReels, false).unwrap();
        let exported = serde_json::to_string(&store.export()).unwrap();
        assert!(exported.contains("\"exportDate\""));

        store.reset().unwrap();
        assert!(store.load().remove_reels);
        let imported = store.import(&exported).unwrap();
        assert!(!imported.remove_reels);
        assert!(!store.load().remove_reels);
    }

    #[test]
    fn import_without_settings_is_rejected() {
        let store = SettingsStore::open_in_memory().unwrap();
        let err = store.import(r#"{"version":"1.0.0"}"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SettingsError>(),
            Some(SettingsError::InvalidExport)
        ));
    }

    #[test]
    fn corrupt_row_falls_back_to_defaults() {
        let store = SettingsStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, 'not json', 0)",
                params![SETTINGS_KEY],
            )
            .unwrap();
        assert!(store.try_load().is_err());
        assert_eq!(store.load().remove_sponsored, Settings::default().remove_sponsored);
    }

    #[test]
    fn open_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.db");
        let store = SettingsStore::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        store.reset().unwrap();
        assert!(path.exists());
    }
}
