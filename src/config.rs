use std::path::{Path, PathBuf};

use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::errors::PrepError;

const CONFIG_FILE: &str = "config.yaml";

/// Default embedding model, also the default collection name
const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
const DEFAULT_BATCH_SIZE: usize = 1;
const DEFAULT_ERROR_RATE: f64 = 0.2;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

const DEFAULT_LLM_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_LLM_MODEL: &str = "gemma3:12b";
const DEFAULT_PARAPHRASE_PREFIX: &str = "activities_paraphrased";

const DEFAULT_VECTOR_HOST: &str = "localhost";
const DEFAULT_VECTOR_PORT: u16 = 6333;

/// Noise injection settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Per character edit probability [0.0, 1.0]
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,

    /// Fixed seed for reproducible runs; random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            error_rate: DEFAULT_ERROR_RATE,
            seed: None,
        }
    }
}

/// Paraphrasing LLM settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama server, e.g. "http://localhost:11434"
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    /// Paraphrases requested per activity
    #[serde(default = "default_num_paraphrases")]
    pub num_paraphrases: usize,

    #[serde(default = "default_paraphrase_prefix")]
    pub output_prefix: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.0,
            num_paraphrases: default_num_paraphrases(),
            output_prefix: DEFAULT_PARAPHRASE_PREFIX.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Collections kept under `<base_path>/collections`
    #[default]
    Local,
    /// Qdrant REST API at `host:port`
    Qdrant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,

    #[serde(default = "default_vector_host")]
    pub host: String,

    #[serde(default = "default_vector_port")]
    pub port: u16,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Local,
            host: DEFAULT_VECTOR_HOST.to_string(),
            port: DEFAULT_VECTOR_PORT,
        }
    }
}

fn default_error_rate() -> f64 {
    DEFAULT_ERROR_RATE
}

fn default_llm_base_url() -> String {
    DEFAULT_LLM_BASE_URL.to_string()
}

fn default_llm_model() -> String {
    DEFAULT_LLM_MODEL.to_string()
}

fn default_num_paraphrases() -> usize {
    1
}

fn default_paraphrase_prefix() -> String {
    DEFAULT_PARAPHRASE_PREFIX.to_string()
}

fn default_vector_host() -> String {
    DEFAULT_VECTOR_HOST.to_string()
}

fn default_vector_port() -> u16 {
    DEFAULT_VECTOR_PORT
}

fn default_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Embedding model name (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Texts per vector store upsert
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default)]
    pub noise: NoiseConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            batch_size: DEFAULT_BATCH_SIZE,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            noise: NoiseConfig::default(),
            llm: LlmConfig::default(),
            vector_store: VectorStoreConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), PrepError> {
        if !(0.0..=1.0).contains(&self.noise.error_rate) {
            return Err(PrepError::config(format!(
                "noise.error_rate must be between 0.0 and 1.0, got {}",
                self.noise.error_rate
            )));
        }

        if self.batch_size == 0 {
            return Err(PrepError::config("batch_size must be greater than 0"));
        }

        if self.download_timeout_secs == 0 {
            return Err(PrepError::config("download_timeout_secs must be greater than 0"));
        }

        if self.model.trim().is_empty() {
            return Err(PrepError::config("model must not be empty"));
        }

        let llm = &self.llm;
        if llm.temperature.is_nan() || llm.temperature < 0.0 {
            return Err(PrepError::config(format!(
                "llm.temperature must not be negative, got {}",
                llm.temperature
            )));
        }
        if llm.num_paraphrases == 0 {
            return Err(PrepError::config("llm.num_paraphrases must be greater than 0"));
        }
        if let Err(e) = url::Url::parse(&llm.base_url) {
            return Err(PrepError::config(format!(
                "llm.base_url '{}' is not a valid url: {e}",
                llm.base_url
            )));
        }

        if self.vector_store.port == 0 {
            return Err(PrepError::config("vector_store.port must be greater than 0"));
        }

        Ok(())
    }

    /// `APREP_BASE_PATH`, or `~/.local/share/aprep`.
    pub fn default_base_path() -> Result<PathBuf, PrepError> {
        if let Ok(path) = std::env::var("APREP_BASE_PATH") {
            return Ok(PathBuf::from(path));
        }

        let home = my_home()
            .map_err(|e| PrepError::config(format!("could not determine home directory: {e}")))?
            .ok_or_else(|| PrepError::config("home directory path is empty"))?;

        Ok(home.join(".local").join("share").join("aprep"))
    }

    /// Load `config.yaml` from `base_path`, writing the defaults first if it
    /// does not exist.
    pub fn load_with(base_path: &Path) -> Result<Self, PrepError> {
        std::fs::create_dir_all(base_path).map_err(|e| PrepError::io(base_path, e))?;
        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            let defaults = serde_yml::to_string(&Self::default())
                .map_err(|e| PrepError::config(e.to_string()))?;
            std::fs::write(&config_path, defaults).map_err(|e| PrepError::io(&config_path, e))?;
        }

        let config_str =
            std::fs::read_to_string(&config_path).map_err(|e| PrepError::io(&config_path, e))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .map_err(|e| PrepError::config(format!("{} is malformed: {e}", config_path.display())))?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        Ok(config)
    }

    /// Directory of the local vector store.
    pub fn collections_dir(&self) -> PathBuf {
        self.base_path.join("collections")
    }

    /// Directory fastembed caches model files in.
    pub fn model_cache_dir(&self) -> PathBuf {
        self.base_path.clone()
    }
}
