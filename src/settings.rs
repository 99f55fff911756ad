//! User preferences for the presentation layer
//!
//! A flat key-value store persisted as a JSON object. Nothing in the session
//! or poller reads from it.

use crate::error::Result;
use crate::logging::get_logger;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Key under which the colour theme is stored
pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Key-value preference storage
pub trait SettingsStore: Send + Sync {
    fn get_value(&self, key: &str) -> Option<Value>;

    fn set_value(&mut self, key: &str, value: Value) -> Result<()>;

    /// Returns the removed value, if any
    fn remove(&mut self, key: &str) -> Result<Option<Value>>;

    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T>
    where
        Self: Sized,
    {
        self.get_value(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<()>
    where
        Self: Sized,
    {
        let value = serde_json::to_value(value)?;
        self.set_value(key, value)
    }

    /// Stored theme; unknown or missing values read as the default
    fn theme(&self) -> Theme
    where
        Self: Sized,
    {
        self.get(THEME_KEY).unwrap_or_default()
    }

    fn set_theme(&mut self, theme: Theme) -> Result<()>
    where
        Self: Sized,
    {
        self.set(THEME_KEY, theme)
    }
}

/// Settings kept only in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: Map<String, Value>,
}

impl SettingsStore for MemorySettings {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set_value(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.remove(key))
    }
}

/// Settings persisted to a JSON file; every write is flushed to disk
pub struct JsonFileSettings {
    file_path: PathBuf,
    values: Map<String, Value>,
    logger: crate::logging::StructuredLogger,
}

impl JsonFileSettings {
    /// Open the store; a missing file starts empty
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let logger = get_logger("settings");
        let file_path = file_path.as_ref().to_path_buf();

        let values = if file_path.exists() {
            let contents = std::fs::read_to_string(&file_path)?;
            match serde_json::from_str::<Value>(&contents)? {
                Value::Object(map) => {
                    logger.info(&format!("Loaded {} settings from disk", map.len()));
                    map
                }
                _ => {
                    logger.warn("Settings file is not a JSON object, starting empty");
                    Map::new()
                }
            }
        } else {
            logger.info("No settings file found, using defaults");
            Map::new()
        };

        Ok(Self {
            file_path,
            values,
            logger,
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.file_path, contents)?;
        self.logger.debug("Saved settings to disk");
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set_value(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }
}
