use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::analyst::DEFAULT_API_URL;

/// Events from this binary at info and above
pub const DEFAULT_LOG_FILTER: &str = concat!(env!("CARGO_CRATE_NAME"), "=info");

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub api_url: Option<String>,
    pub log_filter: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn save_api_url(url: &str) -> Result<PathBuf> {
        let path = Self::get_config_path()?;
        let mut config = Self::load_from(&path).unwrap_or_else(|_| Self::new());
        config.api_url = Some(url.to_string());
        config.save_to(&path)?;
        Ok(path)
    }

    /// Backend base URL: explicit flag or `ANALYST_API_URL` first, then the
    /// config file, then the local development server.
    pub fn resolve_api_url(&self, override_url: Option<&str>) -> String {
        let non_blank = |url: &&str| !url.trim().is_empty();
        override_url
            .filter(non_blank)
            .or(self.api_url.as_deref().filter(non_blank))
            .unwrap_or(DEFAULT_API_URL)
            .to_string()
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("analyst-chat").join("config.json"))
    }

    pub fn get_log_path() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not determine cache directory"))?;

        Ok(cache_dir.join("analyst-chat").join("analyst.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.resolve_api_url(None), "http://localhost:8000");
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            api_url: Some("https://analyst.example.com".to_string()),
            log_filter: None,
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_api_url_precedence() {
        let config = Config {
            api_url: Some("http://from-config:8000".to_string()),
            log_filter: None,
        };
        assert_eq!(
            config.resolve_api_url(Some("http://from-flag:9000")),
            "http://from-flag:9000"
        );
        assert_eq!(config.resolve_api_url(None), "http://from-config:8000");
        assert_eq!(config.resolve_api_url(Some("  ")), "http://from-config:8000");
        assert_eq!(Config::new().resolve_api_url(Some("  ")), DEFAULT_API_URL);
    }

    #[test]
    fn test_default_log_filter_admits_session_events() {
        use crate::dataset::DatasetFile;
        use crate::session::Session;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::{EnvFilter, Layer};

        struct CountEvents(Arc<AtomicUsize>);

        impl<S: tracing::Subscriber> Layer<S> for CountEvents {
            fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry()
            .with(EnvFilter::new(DEFAULT_LOG_FILTER))
            .with(CountEvents(seen.clone()));

        tracing::subscriber::with_default(subscriber, || {
            Session::new().select_file(DatasetFile::new("a.csv"));
        });

        assert_eq!(DEFAULT_LOG_FILTER, "analyst=info");
        assert!(seen.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
