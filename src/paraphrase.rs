//! LLM paraphrase generation for cleaned activity labels.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::artifacts;
use crate::config::LlmConfig;
use crate::errors::PrepError;
use crate::extract::LabelMapping;

const SYSTEM_PROMPT: &str = "You are a paraphrasing assistant. Your only task is to generate a concise English paraphrase of the input text that preserves its meaning. \
Do NOT include explanations, definitions, notes, or any extra information. Your output must: \
be brief and concise (no more words than the input), contain no newline characters ('\\n') or '\"', punctuation, or formatting, \
and only include the paraphrased text, nothing else.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// One generated paraphrase. `cleared_activity` is the on-disk key name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParaphraseRecord {
    pub original_activity: String,
    pub cleared_activity: String,
    pub paraphrase: String,
}

/// Something that can rephrase a short text.
pub trait Paraphraser {
    fn model_name(&self) -> &str;
    fn paraphrase(&self, text: &str) -> Result<String, PrepError>;
}

/// Paraphraser backed by an Ollama server's chat endpoint.
pub struct OllamaParaphraser {
    client: reqwest::blocking::Client,
    endpoint: url::Url,
    model: String,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OllamaParaphraser {
    pub fn new(config: &LlmConfig) -> Result<Self, PrepError> {
        let base = url::Url::parse(&config.base_url)
            .map_err(|e| PrepError::config(format!("llm.base_url '{}': {e}", config.base_url)))?;
        let endpoint = base
            .join("api/chat")
            .map_err(|e| PrepError::config(format!("llm.base_url '{}': {e}", config.base_url)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

impl Paraphraser for OllamaParaphraser {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn paraphrase(&self, text: &str) -> Result<String, PrepError> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "options": { "temperature": self.temperature },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text },
            ],
        });

        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()?;
        let status = resp.status();
        let chat: ChatResponse = resp.json()?;

        if let Some(error) = chat.error {
            log::warn!("ollama error: status={status} error={error}");
            return Err(PrepError::Llm(error));
        }

        chat.message
            .map(|m| m.content.trim().to_string())
            .ok_or_else(|| PrepError::Llm(format!("no message in response (status {status})")))
    }
}

/// Ask `paraphraser` for `num_paraphrases` paraphrases of every cleaned
/// label in `activities`, in mapping order.
///
/// Failures from the paraphraser are returned as is.
pub fn generate_paraphrases(
    activities: &LabelMapping,
    paraphraser: &dyn Paraphraser,
    num_paraphrases: usize,
) -> Result<Vec<ParaphraseRecord>, PrepError> {
    let total = (activities.len() * num_paraphrases) as u64;
    let progress = ProgressBar::new(total).with_message("Generating paraphrases");
    if let Ok(style) = ProgressStyle::with_template("{msg} {bar:40} {pos}/{len} [{elapsed_precise}]") {
        progress.set_style(style);
    }

    let mut results = Vec::with_capacity(total as usize);
    for (original, cleaned) in activities.iter() {
        for _ in 0..num_paraphrases {
            let paraphrase = paraphraser.paraphrase(cleaned)?;
            results.push(ParaphraseRecord {
                original_activity: original.to_string(),
                cleared_activity: cleaned.to_string(),
                paraphrase,
            });
            progress.inc(1);
        }
    }
    progress.finish_and_clear();

    Ok(results)
}

/// `{prefix}_{n}_temp_{temperature}_{model}.json`, ':' in the model name
/// replaced by '-'.
pub fn output_file_name(prefix: &str, num_paraphrases: usize, temperature: f32, model: &str) -> String {
    format!(
        "{prefix}_{num_paraphrases}_temp_{temperature:?}_{}.json",
        model.replace(':', "-")
    )
}

/// Load the mapping at `mapping_path`, generate paraphrases with `paraphraser`
/// and write them into `out_dir`. Returns the written file path.
pub fn generate_and_save(
    mapping_path: &Path,
    out_dir: &Path,
    paraphraser: &dyn Paraphraser,
    config: &LlmConfig,
) -> Result<PathBuf, PrepError> {
    let activities: LabelMapping = artifacts::read_json(mapping_path)?;
    log::info!(
        "Paraphrasing {} activities with '{}'",
        activities.len(),
        paraphraser.model_name()
    );

    let records = generate_paraphrases(&activities, paraphraser, config.num_paraphrases)?;

    let path = out_dir.join(output_file_name(
        &config.output_prefix,
        config.num_paraphrases,
        config.temperature,
        paraphraser.model_name(),
    ));
    artifacts::write_json(&path, &records)?;
    log::info!("Paraphrased activities saved to {}", path.display());

    Ok(path)
}
