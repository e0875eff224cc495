//! Configured parameter values.
//!
//! Values are grouped in sections named after the task family they apply to,
//! and are consulted when a task is built without an explicit value for a
//! parameter, before the declared default.
//!
//! ```toml
//! [DailyReport]
//! recipients = "ops@example.com"
//!
//! ["reports.Weekly"]
//! limit = 3
//! tags = ["a", "b"]
//! ```
//!
//! Every value is kept as a string and goes through the parameter's parser,
//! so the formats are the same as on the wire. Arrays and inline tables are
//! stored as JSON.

use std::collections::HashMap;

use camino::Utf8Path;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct ParamConfig {
    sections: HashMap<String, HashMap<String, String>>,
}

impl ParamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;

        tracing::debug!(
            "loaded parameter configuration from {path} ({} sections)",
            config.sections.len()
        );

        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = text.parse()?;
        let mut config = Self::default();

        for (section, entries) in table {
            let toml::Value::Table(entries) = entries else {
                return Err(ConfigError::Section(section));
            };

            for (key, value) in entries {
                let text = render(&section, &key, value)?;
                config.set(&section, key, text);
            }
        }

        Ok(config)
    }

    /// Sets the value of parameter `key` for task family `family`.
    pub fn set(&mut self, family: &str, key: impl Into<String>, value: impl Into<String>) {
        self.sections
            .entry(family.to_string())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn get(&self, family: &str, key: &str) -> Option<&str> {
        self.sections
            .get(family)
            .and_then(|section| section.get(key))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(HashMap::is_empty)
    }
}

fn render(section: &str, key: &str, value: toml::Value) -> Result<String, ConfigError> {
    use toml::Value;

    match value {
        Value::String(text) => Ok(text),
        Value::Integer(n) => Ok(n.to_string()),
        Value::Float(n) => Ok(n.to_string()),
        Value::Boolean(b) => Ok(b.to_string()),
        Value::Datetime(dt) => Ok(dt.to_string()),
        Value::Array(_) | Value::Table(_) => {
            serde_json::to_string(&value).map_err(|_| ConfigError::Value {
                section: section.to_string(),
                key: key.to_string(),
                found: value.type_str(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [DailyReport]
        recipients = "ops@example.com"
        dry = true

        ["reports.Weekly"]
        limit = 3
        ratio = 0.5
        since = 2014-09-13
        tags = ["a", "b"]
        extra = { depth = 2 }
    "#;

    #[test]
    fn test_scalars_become_strings() {
        let config = ParamConfig::from_toml_str(CONFIG).unwrap();

        assert_eq!(config.get("DailyReport", "recipients"), Some("ops@example.com"));
        assert_eq!(config.get("DailyReport", "dry"), Some("true"));
        assert_eq!(config.get("reports.Weekly", "limit"), Some("3"));
        assert_eq!(config.get("reports.Weekly", "ratio"), Some("0.5"));
        assert_eq!(config.get("reports.Weekly", "since"), Some("2014-09-13"));
        assert_eq!(config.get("reports.Weekly", "missing"), None);
        assert_eq!(config.get("Weekly", "limit"), None);
    }

    #[test]
    fn test_containers_become_json() {
        let config = ParamConfig::from_toml_str(CONFIG).unwrap();

        assert_eq!(config.get("reports.Weekly", "tags"), Some(r#"["a","b"]"#));
        assert_eq!(config.get("reports.Weekly", "extra"), Some(r#"{"depth":2}"#));
    }

    #[test]
    fn test_top_level_value_rejected() {
        let err = ParamConfig::from_toml_str("limit = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Section(ref key) if key == "limit"));

        let err = ParamConfig::from_toml_str("[Broken").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_set_overrides() {
        let mut config = ParamConfig::new();
        assert!(config.is_empty());

        config.set("MyTask", "n", "1");
        config.set("MyTask", "n", "2");
        assert_eq!(config.get("MyTask", "n"), Some("2"));
        assert!(!config.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err = ParamConfig::from_file("/nonexistent/tsumiki.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileSystem(_)));
    }
}
