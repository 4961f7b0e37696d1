//! Merging paraphrase runs.
//!
//! Several generation runs (different LLMs, temperatures) each produce one
//! [`ParaphraseRecord`] per attempt. Merging groups them by original label,
//! keeps the first occurrence of each paraphrase and takes the cleaned label
//! from the last record seen.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::artifacts;
use crate::errors::PrepError;
use crate::paraphrase::ParaphraseRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedParaphraseGroup {
    pub original_activity: String,
    pub cleaned_activity: String,
    #[serde(default)]
    pub paraphrases: Vec<String>,
}

/// Group records by original label, in first seen order.
pub fn merge_records<I>(records: I) -> Vec<MergedParaphraseGroup>
where
    I: IntoIterator<Item = ParaphraseRecord>,
{
    let mut groups: Vec<MergedParaphraseGroup> = vec![];
    let mut by_original: HashMap<String, usize> = HashMap::new();

    for record in records {
        let idx = *by_original
            .entry(record.original_activity.clone())
            .or_insert_with(|| {
                groups.push(MergedParaphraseGroup {
                    original_activity: record.original_activity.clone(),
                    cleaned_activity: String::new(),
                    paraphrases: vec![],
                });
                groups.len() - 1
            });

        let group = &mut groups[idx];
        group.cleaned_activity = record.cleared_activity;
        if !group.paraphrases.contains(&record.paraphrase) {
            group.paraphrases.push(record.paraphrase);
        }
    }

    groups
}

/// Merge paraphrase files, in the given order, into `output`.
pub fn merge_paraphrases(files: &[PathBuf], output: &Path) -> Result<Vec<MergedParaphraseGroup>, PrepError> {
    let mut records: Vec<ParaphraseRecord> = vec![];
    for file in files {
        let mut batch: Vec<ParaphraseRecord> = artifacts::read_json(file)?;
        log::debug!("read {} records from {}", batch.len(), file.display());
        records.append(&mut batch);
    }

    let merged = merge_records(records);
    artifacts::write_json(output, &merged)?;
    log::info!(
        "Merged {} paraphrase groups into '{}'",
        merged.len(),
        output.display()
    );

    Ok(merged)
}
