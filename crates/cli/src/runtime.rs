//! Wires configuration into a storage backend, an oracle and the engine.

use std::sync::Arc;

use easel_engine::{IntentOracle, KeywordOracle, LlmOracle, OpenAiCompatClient, Orchestrator};
use easel_storage::{SqliteStorage, StorageError};

use crate::config::{ConfigError, EaselConfig, OracleKind};

pub type Engine = Orchestrator<SqliteStorage>;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not open database: {0}")]
    Storage(#[from] StorageError),
}

pub fn build_engine(config: &EaselConfig) -> Result<Arc<Engine>, RuntimeError> {
    if let Some(parent) = config.storage.database.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Backend(e.to_string()))?;
        }
    }
    let storage = Arc::new(SqliteStorage::open(&config.storage.database)?);
    let oracle = build_oracle(config)?;
    tracing::info!(
        database = %config.storage.database.display(),
        oracle = ?config.oracle.kind,
        "engine ready"
    );
    Ok(Arc::new(Orchestrator::new(
        storage,
        oracle,
        config.engine_config()?,
    )))
}

fn build_oracle(config: &EaselConfig) -> Result<Arc<dyn IntentOracle>, ConfigError> {
    match config.oracle.kind {
        OracleKind::Keyword => Ok(Arc::new(KeywordOracle::new())),
        OracleKind::Llm => {
            let api_key = config
                .llm
                .api_key
                .clone()
                .ok_or_else(|| ConfigError::Invalid("missing LLM API key".to_string()))?;
            let client = OpenAiCompatClient::new(api_key, config.llm.base_url.clone());
            let mut oracle = LlmOracle::new(Box::new(client), config.llm.model.clone());
            oracle.max_retries = config.llm.max_retries;
            Ok(Arc::new(oracle))
        }
    }
}
