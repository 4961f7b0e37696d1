//! JSON artifacts passed between pipeline stages.
//!
//! Artifacts are UTF-8, pretty printed and written atomically
//! (temp file in the same directory, then rename).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::PrepError;

pub const ORIGINAL_FILE: &str = "activities_original.json";
pub const CLEAN_FILE: &str = "activities_clean.json";
pub const MAPPING_FILE: &str = "activities_mapping.json";

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PrepError> {
    let bytes = fs::read(path).map_err(|e| PrepError::io(path, e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PrepError> {
    let mut data = serde_json::to_vec_pretty(value)?;
    data.push(b'\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PrepError::io(parent, e))?;
    }

    let temp_path = temp_path_for(path);
    if let Err(e) = fs::write(&temp_path, &data) {
        let _ = fs::remove_file(&temp_path);
        return Err(PrepError::io(&temp_path, e));
    }

    fs::rename(&temp_path, path).map_err(|e| PrepError::io(path, e))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}-{}.tmp", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("labels.json");

        let labels = vec!["Approve invoice".to_string(), "Prüfung läuft".to_string()];
        write_json(&path, &labels).unwrap();

        let loaded: Vec<String> = read_json(&path).unwrap();
        assert_eq!(loaded, labels);
    }

    #[test]
    fn test_output_is_indented_and_not_escaped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("labels.json");

        write_json(&path, &vec!["Prüfung – läuft"]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"Prüfung – läuft\""));
    }

    #[test]
    fn test_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("out.json");

        write_json(&path, &Vec::<String>::new()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.json");
        write_json(&path, &vec![1, 2, 3]).unwrap();

        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["out.json".to_string()]);
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result: Result<Vec<String>, _> = read_json(&tmp.path().join("missing.json"));
        assert!(matches!(result, Err(PrepError::Io { .. })));
    }
}
