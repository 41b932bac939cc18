//! SLO document discovery and parsing
//!
//! Walks a directory tree for `.yaml`/`.yml` files and parses each into a
//! typed spec. Parse failures are collected per file and never abort the
//! remaining siblings; admission decides what to do with them.

use std::path::Path;

use walkdir::WalkDir;

use super::{Slo, SloWithFile, ValidationError};

/// Load every SLO document under `dir`
///
/// Returns the successfully parsed specs (each paired with its source
/// path) alongside the per-file errors.
pub fn load_from_directory(dir: impl AsRef<Path>) -> (Vec<SloWithFile>, Vec<ValidationError>) {
    let dir = dir.as_ref();
    let mut slos = Vec::new();
    let mut errors = Vec::new();

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && has_yaml_extension(entry.path()) {
                    files.push(entry.into_path());
                }
            }
            Err(err) => {
                errors.push(ValidationError::new(
                    dir.display().to_string(),
                    "",
                    format!("failed to read directory: {err}"),
                ));
            }
        }
    }

    files.sort();

    for file in files {
        let display = file.display().to_string();
        match parse_yaml_file(&file) {
            Ok(slo) => slos.push(SloWithFile { slo, file: display }),
            Err(message) => errors.push(ValidationError::new(display, "", message)),
        }
    }

    (slos, errors)
}

fn has_yaml_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn parse_yaml_file(path: &Path) -> Result<Slo, String> {
    let data = std::fs::read_to_string(path).map_err(|err| format!("failed to read file: {err}"))?;
    serde_yaml::from_str(&data).map_err(|err| format!("failed to parse YAML: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const VALID_DOC: &str = r#"
apiVersion: aegis.dev/v1
kind: SLO
metadata:
  id: api-availability
  service: api
spec:
  environment: production
  objective: 0.99
  complianceWindow: 30d
  evaluationInterval: 1m
  sli:
    type: ratio
    good:
      prometheusQuery: good_total
    total:
      prometheusQuery: all_total
  burnPolicy:
    rules:
      - name: fast-burn
        shortWindow: 5m
        longWindow: 1h
        threshold: 14
        action: BLOCK
"#;

    #[test]
    fn loads_yaml_files_recursively() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.yaml"), VALID_DOC).unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("b.yml"), VALID_DOC).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (slos, errors) = load_from_directory(dir.path());
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        assert_eq!(slos.len(), 2);
        assert!(slos.iter().all(|s| !s.file.is_empty()));
    }

    #[test]
    fn parse_failure_does_not_abort_siblings() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), ":\n  - not: [valid").unwrap();
        std::fs::write(dir.path().join("good.yaml"), VALID_DOC).unwrap();

        let (slos, errors) = load_from_directory(dir.path());
        assert_eq!(slos.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].file.ends_with("bad.yaml"));
        assert!(errors[0].path.is_empty());
        assert!(errors[0].message.contains("parse"));
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let (slos, errors) = load_from_directory(dir.path());
        assert!(slos.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn repeated_loads_return_identical_sets() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.yaml"), VALID_DOC).unwrap();

        let (first, _) = load_from_directory(dir.path());
        let (second, _) = load_from_directory(dir.path());

        let ids = |set: &[SloWithFile]| {
            set.iter()
                .map(|s| (s.slo.metadata.id.clone(), s.file.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }
}
