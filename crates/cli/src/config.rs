//! `easel.toml` loading, environment overrides and validation.
//!
//! # Example
//!
//! ```toml
//! log_level = "info"
//!
//! [storage]
//! database = "easel.db"
//!
//! [server]
//! port = 8080
//!
//! [oracle]
//! kind = "llm"
//!
//! [llm]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//! max_retries = 2
//!
//! [placement]
//! clearance = 8.0
//! nearby_radius = 10.0
//!
//! [shapes]
//! default_color = "#00ff88"
//! ```

use std::path::{Path, PathBuf};

use easel_core::{Color, DEFAULT_COLOR};
use easel_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// Read when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "easel.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EaselConfig {
    pub log_level: String,
    pub storage: StorageSection,
    pub server: ServerSection,
    pub oracle: OracleSection,
    pub llm: LlmSection,
    pub placement: PlacementSection,
    pub shapes: ShapesSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// SQLite database file.
    pub database: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    #[default]
    Keyword,
    Llm,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub kind: OracleKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub max_retries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSection {
    pub clearance: f64,
    pub nearby_radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapesSection {
    pub default_color: String,
}

impl Default for EaselConfig {
    fn default() -> Self {
        EaselConfig {
            log_level: "info".to_string(),
            storage: StorageSection::default(),
            server: ServerSection::default(),
            oracle: OracleSection::default(),
            llm: LlmSection::default(),
            placement: PlacementSection::default(),
            shapes: ShapesSection::default(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        StorageSection {
            database: PathBuf::from("easel.db"),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection { port: 8080 }
    }
}

impl Default for LlmSection {
    fn default() -> Self {
        LlmSection {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            max_retries: 2,
        }
    }
}

impl Default for PlacementSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        PlacementSection {
            clearance: engine.placement_clearance,
            nearby_radius: engine.nearby_radius,
        }
    }
}

impl Default for ShapesSection {
    fn default() -> Self {
        ShapesSection {
            default_color: DEFAULT_COLOR.to_string(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl EaselConfig {
    /// Load `path` (which must exist), or `./easel.toml` if present, or the
    /// defaults; then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::read(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => EaselConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup`; the first non-empty name in each group wins.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
        };

        if let Some(db) = first(&["EASEL_DATABASE", "DATABASE_URL"]) {
            self.storage.database = PathBuf::from(db);
        }
        if let Some(port) = first(&["EASEL_PORT", "PORT"]).and_then(|p| p.trim().parse().ok()) {
            self.server.port = port;
        }
        match first(&["EASEL_ORACLE"]).as_deref().map(str::trim) {
            Some("llm") => self.oracle.kind = OracleKind::Llm,
            Some("keyword") => self.oracle.kind = OracleKind::Keyword,
            Some(other) => tracing::warn!(value = other, "ignoring unknown EASEL_ORACLE"),
            None => {}
        }
        if let Some(key) = first(&["EASEL_LLM_API_KEY", "OPENAI_API_KEY", "API_KEY"]) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = first(&["EASEL_LLM_BASE_URL", "BASE_URL"]) {
            self.llm.base_url = url;
        }
        if let Some(model) = first(&["EASEL_LLM_MODEL", "MODEL_NAME"]) {
            self.llm.model = model;
        }
        if let Some(level) = first(&["EASEL_LOG_LEVEL"]) {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oracle.kind == OracleKind::Llm
            && self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "oracle.kind = \"llm\" requires an API key (llm.api_key or EASEL_LLM_API_KEY)"
                    .to_string(),
            ));
        }
        for (name, value) in [
            ("placement.clearance", self.placement.clearance),
            ("placement.nearby_radius", self.placement.nearby_radius),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        Color::parse(&self.shapes.default_color)
            .map_err(|e| ConfigError::Invalid(format!("shapes.default_color: {e}")))?;
        Ok(())
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let default_color = Color::parse(&self.shapes.default_color)
            .map_err(|e| ConfigError::Invalid(format!("shapes.default_color: {e}")))?;
        Ok(EngineConfig {
            placement_clearance: self.placement.clearance,
            nearby_radius: self.placement.nearby_radius,
            default_color,
            ..EngineConfig::default()
        })
    }

    /// A copy safe to print: the API key keeps only its last four characters.
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.llm.api_key = copy.llm.api_key.as_deref().map(mask);
        copy
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_else(|e| format!("# serialization error: {e}\n"))
    }
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_partial_file_with_defaults() {
        let config: EaselConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [placement]
            clearance = 3.5
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.placement.clearance, 3.5);
        assert_eq!(config.placement.nearby_radius, 10.0);
        assert_eq!(config.storage.database, PathBuf::from("easel.db"));
        assert_eq!(config.oracle.kind, OracleKind::Keyword);
    }

    #[test]
    fn env_overrides_with_fallback_names() {
        let mut config = EaselConfig::default();
        config.apply_env(env(&[
            ("DATABASE_URL", "/tmp/scene.db"),
            ("PORT", "7070"),
            ("EASEL_PORT", "7171"),
            ("OPENAI_API_KEY", "sk-test-1234"),
            ("EASEL_ORACLE", "llm"),
            ("MODEL_NAME", "local-model"),
        ]));
        assert_eq!(config.storage.database, PathBuf::from("/tmp/scene.db"));
        assert_eq!(config.server.port, 7171);
        assert_eq!(config.oracle.kind, OracleKind::Llm);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test-1234"));
        assert_eq!(config.llm.model, "local-model");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn llm_without_key_rejected() {
        let mut config = EaselConfig::default();
        config.oracle.kind = OracleKind::Llm;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn bad_default_color_rejected() {
        let mut config = EaselConfig::default();
        config.shapes.default_color = "plaid".into();
        assert!(config.validate().is_err());
        assert!(config.engine_config().is_err());
    }

    #[test]
    fn masked_hides_key() {
        let mut config = EaselConfig::default();
        config.llm.api_key = Some("sk-secret-abcd".into());
        let shown = config.masked().to_toml();
        assert!(shown.contains("****abcd"));
        assert!(!shown.contains("sk-secret"));
    }

    #[test]
    fn engine_config_carries_placement() {
        let mut config = EaselConfig::default();
        config.placement.clearance = 2.0;
        config.shapes.default_color = "red".into();
        let engine = config.engine_config().unwrap();
        assert_eq!(engine.placement_clearance, 2.0);
        assert_eq!(engine.default_color, Color::parse("red").unwrap());
    }
}
