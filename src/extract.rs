//! Activity extraction from the process model export.
//!
//! The export is a CSV with a header row. Column 0 holds the model id,
//! column 2 a JSON array of atoms, each with an `operands` list of raw
//! activity labels. Every operand is cleaned with [`clean_label`] and
//! recorded three ways: the raw list, the cleaned list and a raw -> cleaned
//! mapping.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Instant;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::artifacts::{self, CLEAN_FILE, MAPPING_FILE, ORIGINAL_FILE};
use crate::errors::PrepError;
use crate::normalize::clean_label;

const MODEL_ID_COLUMN: usize = 0;
const ATOMS_COLUMN: usize = 2;

/// One row of the export.
#[derive(Debug, Clone)]
pub struct DatasetRow {
    pub model_id: String,
    pub atoms: String,
}

/// Raw label -> cleaned label, keys unique, in first insertion order.
///
/// Inserting an existing raw label overwrites its cleaned value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMapping {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl LabelMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, raw: String, cleaned: String) {
        match self.index.get(&raw) {
            Some(&idx) => self.entries[idx].1 = cleaned,
            None => {
                self.index.insert(raw.clone(), self.entries.len());
                self.entries.push((raw, cleaned));
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, raw: &str) -> Option<&str> {
        self.index.get(raw).map(|&idx| self.entries[idx].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(raw, cleaned)| (raw.as_str(), cleaned.as_str()))
    }
}

impl Serialize for LabelMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (raw, cleaned) in &self.entries {
            map.serialize_entry(raw, cleaned)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LabelMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = LabelMapping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of raw activity label to cleaned label")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<LabelMapping, A::Error> {
                let mut mapping = LabelMapping::new();
                while let Some((raw, cleaned)) = access.next_entry::<String, String>()? {
                    mapping.insert(raw, cleaned);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

/// Output of an extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractedActivities {
    /// Every operand, in dataset order, repeats included.
    pub raw: Vec<String>,
    /// `raw[i]` cleaned.
    pub cleaned: Vec<String>,
    pub mapping: LabelMapping,
    pub skipped_rows: usize,
    pub skipped_atoms: usize,
}

impl ExtractedActivities {
    fn push(&mut self, operand: &str) {
        let cleaned = clean_label(operand);
        self.raw.push(operand.to_string());
        self.cleaned.push(cleaned.clone());
        self.mapping.insert(operand.to_string(), cleaned);
    }

    /// Write the three artifacts into `out_dir`.
    pub fn save(&self, out_dir: &Path) -> Result<(), PrepError> {
        artifacts::write_json(&out_dir.join(ORIGINAL_FILE), &self.raw)?;
        artifacts::write_json(&out_dir.join(CLEAN_FILE), &self.cleaned)?;
        artifacts::write_json(&out_dir.join(MAPPING_FILE), &self.mapping)?;
        Ok(())
    }
}

/// Extract and clean activities from already loaded rows.
///
/// Rows with malformed JSON and atoms without operands are logged and
/// skipped; neither stops the run.
pub fn extract_activities<I>(rows: I) -> ExtractedActivities
where
    I: IntoIterator<Item = DatasetRow>,
{
    let mut out = ExtractedActivities::default();

    for row in rows {
        let atoms = match serde_json::from_str::<Value>(&row.atoms) {
            Ok(Value::Array(atoms)) => atoms,
            Ok(_) => {
                log::warn!("Skipping non-list atoms in model {}", row.model_id);
                out.skipped_rows += 1;
                continue;
            }
            Err(err) => {
                log::warn!("Skipping invalid JSON in model {}: {err}", row.model_id);
                out.skipped_rows += 1;
                continue;
            }
        };

        for atom in atoms {
            let operands = match atom.get("operands").and_then(Value::as_array) {
                Some(operands) if !operands.is_empty() => operands,
                _ => {
                    log::warn!("Skipping atom without operands: {atom}");
                    out.skipped_atoms += 1;
                    continue;
                }
            };

            for operand in operands {
                match operand.as_str() {
                    Some(text) => out.push(text),
                    None => log::warn!(
                        "Skipping non-string operand {operand} in model {}",
                        row.model_id
                    ),
                }
            }
        }
    }

    out
}

/// Read the export CSV at `path`.
pub fn read_dataset(path: &Path) -> Result<Vec<DatasetRow>, PrepError> {
    let now = Instant::now();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut rows = vec![];
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        match (record.get(MODEL_ID_COLUMN), record.get(ATOMS_COLUMN)) {
            (Some(model_id), Some(atoms)) => rows.push(DatasetRow {
                model_id: model_id.to_string(),
                atoms: atoms.to_string(),
            }),
            _ => log::warn!("Skipping short record at data line {}", line + 1),
        }
    }

    log::debug!(
        "took {}ms to read {} rows from {}",
        now.elapsed().as_micros() as f64 / 1000.0,
        rows.len(),
        path.display()
    );

    Ok(rows)
}

/// Extract activities from the CSV at `input`, write the artifacts into
/// `out_dir` and return the result.
pub fn extract_and_process_activities(
    input: &Path,
    out_dir: &Path,
) -> Result<ExtractedActivities, PrepError> {
    let rows = read_dataset(input)?;
    let extracted = extract_activities(rows);
    extracted.save(out_dir)?;

    log::info!(
        "Extracted {} activities ({} unique), skipped {} rows and {} atoms",
        extracted.raw.len(),
        extracted.mapping.len(),
        extracted.skipped_rows,
        extracted.skipped_atoms
    );

    Ok(extracted)
}
