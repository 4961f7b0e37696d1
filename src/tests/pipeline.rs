use std::cell::Cell;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::artifacts::{self, CLEAN_FILE, MAPPING_FILE, ORIGINAL_FILE};
use crate::config::LlmConfig;
use crate::errors::PrepError;
use crate::extract::{self, LabelMapping};
use crate::merge::{self, MergedParaphraseGroup};
use crate::noise;
use crate::paraphrase::{self, ParaphraseRecord, Paraphraser};

/// Numbers every answer so repeated calls differ.
struct CountingParaphraser {
    model: &'static str,
    calls: Cell<usize>,
}

impl CountingParaphraser {
    fn new(model: &'static str) -> Self {
        Self {
            model,
            calls: Cell::new(0),
        }
    }
}

impl Paraphraser for CountingParaphraser {
    fn model_name(&self) -> &str {
        self.model
    }

    fn paraphrase(&self, text: &str) -> Result<String, PrepError> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        Ok(format!("{text} v{}", n % 2))
    }
}

fn write_dataset(path: &Path, rows: &[(&str, &str)]) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(["model_id", "name", "atoms"]).unwrap();
    for (model_id, atoms) in rows {
        writer.write_record([*model_id, "model", *atoms]).unwrap();
    }
    writer.flush().unwrap();
}

fn record(original: &str, cleaned: &str, paraphrase: &str) -> ParaphraseRecord {
    ParaphraseRecord {
        original_activity: original.to_string(),
        cleared_activity: cleaned.to_string(),
        paraphrase: paraphrase.to_string(),
    }
}

fn llm_config(model: &str, num_paraphrases: usize) -> LlmConfig {
    LlmConfig {
        model: model.to_string(),
        num_paraphrases,
        ..LlmConfig::default()
    }
}

fn extract_fixture(dir: &Path) -> extract::ExtractedActivities {
    let csv_path = dir.join("dataset.csv");
    write_dataset(
        &csv_path,
        &[
            (
                "m1",
                r#"[{"operands": ["6 SZ - XX - 01 - Approve invoice", "EWM - Pick items"]}]"#,
            ),
            ("m2", "{not json"),
            (
                "m3",
                r#"[{"operands": []}, {"operands": ["J11 Confirm order", "EWM - Pick items"]}]"#,
            ),
        ],
    );
    extract::extract_and_process_activities(&csv_path, dir).unwrap()
}

#[test]
fn extraction_writes_all_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let extracted = extract_fixture(tmp.path());

    assert_eq!(extracted.skipped_rows, 1);
    assert_eq!(extracted.skipped_atoms, 1);

    let raw: Vec<String> = artifacts::read_json(&tmp.path().join(ORIGINAL_FILE)).unwrap();
    let cleaned: Vec<String> = artifacts::read_json(&tmp.path().join(CLEAN_FILE)).unwrap();
    let mapping: LabelMapping = artifacts::read_json(&tmp.path().join(MAPPING_FILE)).unwrap();

    assert_eq!(
        raw,
        vec![
            "6 SZ - XX - 01 - Approve invoice",
            "EWM - Pick items",
            "J11 Confirm order",
            "EWM - Pick items",
        ]
    );
    assert_eq!(
        cleaned,
        vec!["Approve invoice", "Pick items", "Confirm order", "Pick items"]
    );

    let keys: Vec<&str> = mapping.iter().map(|(raw, _)| raw).collect();
    assert_eq!(
        keys,
        vec!["6 SZ - XX - 01 - Approve invoice", "EWM - Pick items", "J11 Confirm order"]
    );
    assert_eq!(mapping.get("J11 Confirm order"), Some("Confirm order"));
}

#[test]
fn missing_dataset_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let result = extract::extract_and_process_activities(&tmp.path().join("nope.csv"), tmp.path());
    assert!(result.is_err());
}

#[test]
fn full_pipeline_from_csv_to_noisy_paraphrases() {
    let tmp = tempfile::tempdir().unwrap();
    extract_fixture(tmp.path());
    let mapping_path = tmp.path().join(MAPPING_FILE);

    let first = paraphrase::generate_and_save(
        &mapping_path,
        tmp.path(),
        &CountingParaphraser::new("gemma3:12b"),
        &llm_config("gemma3:12b", 2),
    )
    .unwrap();
    let second = paraphrase::generate_and_save(
        &mapping_path,
        tmp.path(),
        &CountingParaphraser::new("llama3:8b"),
        &llm_config("llama3:8b", 1),
    )
    .unwrap();

    assert_eq!(
        first.file_name().unwrap(),
        "activities_paraphrased_2_temp_0.0_gemma3-12b.json"
    );
    let records: Vec<ParaphraseRecord> = artifacts::read_json(&first).unwrap();
    assert_eq!(records.len(), 6);

    let merged_path = tmp.path().join("merged.json");
    let merged = merge::merge_paraphrases(&[first, second], &merged_path).unwrap();

    let originals: Vec<&str> = merged.iter().map(|g| g.original_activity.as_str()).collect();
    assert_eq!(
        originals,
        vec!["6 SZ - XX - 01 - Approve invoice", "EWM - Pick items", "J11 Confirm order"]
    );
    // the second run only repeats earlier answers
    assert_eq!(
        merged[0].paraphrases,
        vec!["Approve invoice v0", "Approve invoice v1"]
    );
    assert_eq!(merged[1].cleaned_activity, "Pick items");

    let clean_path = tmp.path().join("clean_copy.json");
    let mut rng = StdRng::seed_from_u64(1);
    noise::add_noise_to_paraphrases(&merged_path, &clean_path, 0.0, &mut rng).unwrap();
    let untouched: Vec<MergedParaphraseGroup> = artifacts::read_json(&clean_path).unwrap();
    assert_eq!(untouched, merged);

    let noisy_path = tmp.path().join(noise::default_output_name(0.3));
    let count = noise::add_noise_to_paraphrases(&merged_path, &noisy_path, 0.3, &mut rng).unwrap();
    assert_eq!(count, 3);

    let noisy: Vec<MergedParaphraseGroup> = artifacts::read_json(&noisy_path).unwrap();
    for (before, after) in merged.iter().zip(&noisy) {
        assert_eq!(before.original_activity, after.original_activity);
        assert_eq!(before.cleaned_activity, after.cleaned_activity);
        assert_eq!(before.paraphrases.len(), after.paraphrases.len());
        assert!(after.paraphrases.iter().all(|p| !p.is_empty()));
    }
}

#[test]
fn noise_runs_are_reproducible_with_a_seed() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("merged.json");
    artifacts::write_json(
        &input,
        &merge::merge_records(vec![
            record("Ship order", "Ship order", "Send order"),
            record("Ship order", "Ship order", "Dispatch the order"),
        ]),
    )
    .unwrap();

    let outputs: Vec<PathBuf> = (0..2).map(|i| tmp.path().join(format!("n{i}.json"))).collect();
    for output in &outputs {
        let mut rng = StdRng::seed_from_u64(42);
        noise::add_noise_to_paraphrases(&input, output, 0.5, &mut rng).unwrap();
    }

    let a = std::fs::read_to_string(&outputs[0]).unwrap();
    let b = std::fs::read_to_string(&outputs[1]).unwrap();
    assert_eq!(a, b);
}

#[test]
fn merge_dedups_across_files() {
    let tmp = tempfile::tempdir().unwrap();
    let first = tmp.path().join("a.json");
    let second = tmp.path().join("b.json");
    artifacts::write_json(
        &first,
        &vec![
            record("Ship order", "Ship order", "Send order"),
            record("Ship order", "Ship order", "Send order"),
        ],
    )
    .unwrap();
    artifacts::write_json(
        &second,
        &vec![record("Ship order", "Ship order", "Dispatch order")],
    )
    .unwrap();

    let output = tmp.path().join("out").join("merged.json");
    let merged = merge::merge_paraphrases(&[first, second], &output).unwrap();

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].paraphrases, vec!["Send order", "Dispatch order"]);

    let on_disk: Vec<MergedParaphraseGroup> = artifacts::read_json(&output).unwrap();
    assert_eq!(on_disk, merged);
}

#[test]
fn merge_with_missing_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let result = merge::merge_paraphrases(
        &[tmp.path().join("missing.json")],
        &tmp.path().join("merged.json"),
    );
    assert!(matches!(result, Err(PrepError::Io { .. })));
}
