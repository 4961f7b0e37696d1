//! Synthetic typo injection for paraphrase sets.
//!
//! Every character position is hit with probability `error_rate`. A hit
//! applies one of three edits, picked uniformly:
//! - replace the character with a random ASCII letter
//! - delete the character (skipped when only one character is left)
//! - insert a random ASCII letter in front of it
//!
//! The random source is always passed in, so a seeded `StdRng` gives
//! reproducible output.

use std::path::Path;

use rand::Rng;
use serde_json::Value;

use crate::artifacts;
use crate::errors::PrepError;

const ASCII_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const PARAPHRASES_KEY: &str = "paraphrases";

/// A single noise edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Replace,
    Delete,
    Insert,
}

/// Where the random decisions of a noise pass come from.
trait EditSource {
    /// Whether the character under the cursor gets an edit.
    fn hit(&mut self, error_rate: f64) -> bool;
    fn edit(&mut self) -> Edit;
    fn letter(&mut self) -> char;
}

struct RngEdits<'a, R: ?Sized>(&'a mut R);

impl<R: Rng + ?Sized> EditSource for RngEdits<'_, R> {
    fn hit(&mut self, error_rate: f64) -> bool {
        self.0.random::<f64>() < error_rate
    }

    fn edit(&mut self) -> Edit {
        match self.0.random_range(0..3) {
            0 => Edit::Replace,
            1 => Edit::Delete,
            _ => Edit::Insert,
        }
    }

    fn letter(&mut self) -> char {
        ASCII_LETTERS[self.0.random_range(0..ASCII_LETTERS.len())] as char
    }
}

/// Apply character level noise to `text`.
///
/// `error_rate` of 0 returns the input unchanged, an empty input is
/// returned as is, and a non-empty input never becomes empty.
pub fn add_noise<R: Rng + ?Sized>(text: &str, error_rate: f64, rng: &mut R) -> String {
    apply_edits(text, error_rate, &mut RngEdits(rng))
}

fn apply_edits<S: EditSource>(text: &str, error_rate: f64, source: &mut S) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut cursor = 0;

    while cursor < chars.len() {
        if source.hit(error_rate) {
            match source.edit() {
                Edit::Replace => {
                    chars[cursor] = source.letter();
                }
                Edit::Delete if chars.len() > 1 => {
                    // the next character shifts into `cursor` and gets its own draw
                    chars.remove(cursor);
                    continue;
                }
                Edit::Delete => {}
                Edit::Insert => {
                    chars.insert(cursor, source.letter());
                    cursor += 1;
                }
            }
        }
        cursor += 1;
    }

    chars.into_iter().collect()
}

/// Apply [`add_noise`] to the `paraphrases` of every record.
///
/// Records are kept as loose JSON so every other field passes through
/// untouched. A record without `paraphrases` gets an empty list.
pub fn noisy_records<R: Rng + ?Sized>(
    records: Vec<Value>,
    error_rate: f64,
    rng: &mut R,
) -> Vec<Value> {
    records
        .into_iter()
        .map(|mut record| {
            if let Value::Object(fields) = &mut record {
                let paraphrases = match fields.get(PARAPHRASES_KEY) {
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|item| match item {
                            Value::String(text) => Value::String(add_noise(text, error_rate, rng)),
                            other => {
                                log::warn!("Keeping non-string paraphrase {other}");
                                other.clone()
                            }
                        })
                        .collect(),
                    _ => vec![],
                };
                fields.insert(PARAPHRASES_KEY.to_string(), Value::Array(paraphrases));
            } else {
                log::warn!("Passing through non-object record {record}");
            }
            record
        })
        .collect()
}

/// Read merged paraphrase records, add noise to every paraphrase and write
/// the result to `output`.
pub fn add_noise_to_paraphrases<R: Rng + ?Sized>(
    input: &Path,
    output: &Path,
    error_rate: f64,
    rng: &mut R,
) -> Result<usize, PrepError> {
    let records: Vec<Value> = artifacts::read_json(input)?;
    let noisy = noisy_records(records, error_rate, rng);

    artifacts::write_json(output, &noisy)?;
    log::info!(
        "Noisy paraphrases ({} groups, error rate {}) saved to {}",
        noisy.len(),
        error_rate,
        output.display()
    );

    Ok(noisy.len())
}

/// File name used for a noise pass when no output path is given.
pub fn default_output_name(error_rate: f64) -> String {
    format!("activities_with_synonyms_merged_noise_{error_rate:?}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::collections::VecDeque;

    #[test]
    fn test_zero_rate_is_identity() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_eq!(add_noise("Approve invoice", 0.0, &mut rng), "Approve invoice");
        }
    }

    #[test]
    fn test_empty_input() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(add_noise("", 1.0, &mut rng), "");
        assert_eq!(add_noise("", 0.5, &mut rng), "");
    }

    #[test]
    fn test_never_empties_text() {
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert!(!add_noise("a", 1.0, &mut rng).is_empty());
            assert!(!add_noise("ab", 1.0, &mut rng).is_empty());
            assert!(!add_noise("Ship order", 0.7, &mut rng).is_empty());
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let text = "Create purchase requisition";

        assert_eq!(add_noise(text, 0.3, &mut a), add_noise(text, 0.3, &mut b));
    }

    #[test]
    fn test_full_rate_changes_text() {
        let text = "Release payment block";
        let changed = (0..20u64)
            .map(|seed| add_noise(text, 1.0, &mut StdRng::seed_from_u64(seed)))
            .filter(|noisy| noisy != text)
            .count();

        assert!(changed > 0);
    }

    #[test]
    fn test_only_ascii_letters_are_introduced() {
        let mut rng = StdRng::seed_from_u64(3);
        let noisy = add_noise("12345 67890", 1.0, &mut rng);

        assert!(noisy
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c.is_ascii_alphabetic()));
    }

    #[test]
    fn test_length_bounds() {
        // each original position adds at most one char
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let text = "Post goods issue";
            let noisy = add_noise(text, 1.0, &mut rng);
            let len = noisy.chars().count();

            assert!(len >= 1);
            assert!(len <= text.chars().count() * 2);
        }
    }

    #[test]
    fn test_multibyte_text_is_handled_per_char() {
        let mut rng = StdRng::seed_from_u64(11);
        let noisy = add_noise("Prüfung läuft", 0.5, &mut rng);
        assert!(!noisy.is_empty());
    }

    /// Replays a fixed list of decisions. `None` is a miss, and the
    /// source misses once the list runs out.
    struct Script {
        steps: VecDeque<Option<Edit>>,
        pending: Option<Edit>,
        letters: VecDeque<char>,
    }

    impl Script {
        fn new(steps: &[Option<Edit>], letters: &str) -> Self {
            Self {
                steps: steps.iter().copied().collect(),
                pending: None,
                letters: letters.chars().collect(),
            }
        }
    }

    impl EditSource for Script {
        fn hit(&mut self, _error_rate: f64) -> bool {
            self.pending = self.steps.pop_front().flatten();
            self.pending.is_some()
        }

        fn edit(&mut self) -> Edit {
            self.pending.take().unwrap()
        }

        fn letter(&mut self) -> char {
            self.letters.pop_front().unwrap()
        }
    }

    use super::Edit::{Delete, Insert, Replace};

    #[test]
    fn test_replace_keeps_position() {
        let mut script = Script::new(&[Some(Replace), None], "X");
        assert_eq!(apply_edits("ab", 1.0, &mut script), "Xb");
        assert!(script.steps.is_empty());
    }

    #[test]
    fn test_delete_redraws_shifted_character() {
        // both deletes land on position 0
        let mut script = Script::new(&[Some(Delete), Some(Delete), None], "");
        assert_eq!(apply_edits("abc", 1.0, &mut script), "c");
        assert!(script.steps.is_empty());
    }

    #[test]
    fn test_insert_skips_past_original_character() {
        // the second draw belongs to 'b', not to the 'a' after the insert
        let mut script = Script::new(&[Some(Insert), Some(Replace)], "XY");
        assert_eq!(apply_edits("ab", 1.0, &mut script), "XaY");
    }

    #[test]
    fn test_delete_of_single_character_is_noop_and_advances() {
        let mut script = Script::new(&[Some(Delete), Some(Replace)], "X");
        assert_eq!(apply_edits("a", 1.0, &mut script), "a");
        // the loop ended after one draw
        assert_eq!(script.steps.len(), 1);
    }

    #[test]
    fn test_delete_down_to_last_character() {
        let mut script = Script::new(&[Some(Delete), Some(Delete)], "");
        assert_eq!(apply_edits("ab", 1.0, &mut script), "b");
        assert!(script.steps.is_empty());
    }

    #[test]
    fn test_all_inserts_double_length() {
        let mut script = Script::new(&[Some(Insert); 4], "WXYZ");
        let noisy = apply_edits("abcd", 1.0, &mut script);

        assert_eq!(noisy, "WaXbYcZd");
        assert_eq!(noisy.chars().count(), 8);
    }

    #[test]
    fn test_noisy_records_keep_structure() {
        let records = vec![
            json!({
                "original_activity": "J11 Ship order",
                "cleaned_activity": "Ship order",
                "paraphrases": ["Send order", "Dispatch order"],
            }),
            json!({
                "original_activity": "EWM - Pick",
                "cleaned_activity": "Pick",
                "paraphrases": [],
            }),
        ];

        let mut rng = StdRng::seed_from_u64(5);
        let noisy = noisy_records(records.clone(), 0.0, &mut rng);
        assert_eq!(noisy, records);

        let noisy = noisy_records(records.clone(), 1.0, &mut rng);
        assert_eq!(noisy.len(), 2);
        assert_eq!(noisy[0]["original_activity"], "J11 Ship order");
        assert_eq!(noisy[0]["cleaned_activity"], "Ship order");
        assert_eq!(noisy[0]["paraphrases"].as_array().unwrap().len(), 2);
        assert_eq!(noisy[1]["paraphrases"], json!([]));
    }

    #[test]
    fn test_noisy_records_pass_other_fields_through() {
        let records = vec![
            json!({
                "original_activity": "J11 Ship order",
                "paraphrases": ["Send order"],
                "model": "gemma3:12b",
            }),
            json!({ "original_activity": "EWM - Pick" }),
        ];

        let mut rng = StdRng::seed_from_u64(9);
        let noisy = noisy_records(records, 0.0, &mut rng);

        assert_eq!(
            noisy[0],
            json!({
                "original_activity": "J11 Ship order",
                "paraphrases": ["Send order"],
                "model": "gemma3:12b",
            })
        );
        assert!(noisy[0].get("cleaned_activity").is_none());
        assert_eq!(
            noisy[1],
            json!({ "original_activity": "EWM - Pick", "paraphrases": [] })
        );
    }

    #[test]
    fn test_batch_file_keeps_extra_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("merged.json");
        let output = tmp.path().join("noisy.json");
        std::fs::write(
            &input,
            r#"[{"original_activity": "Ship order", "paraphrases": ["Send order"], "model": "gemma3:12b"}]"#,
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(add_noise_to_paraphrases(&input, &output, 0.5, &mut rng).unwrap(), 1);

        let written: Vec<Value> = artifacts::read_json(&output).unwrap();
        assert_eq!(written[0]["model"], "gemma3:12b");
        assert_eq!(written[0]["original_activity"], "Ship order");
        assert_eq!(written[0]["paraphrases"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output_name(0.2),
            "activities_with_synonyms_merged_noise_0.2.json"
        );
        assert_eq!(
            default_output_name(0.0),
            "activities_with_synonyms_merged_noise_0.0.json"
        );
    }
}
