use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Finds `<model>.labels.txt` next to the model, then under `models/`.
pub fn resolve_labels_path(model_path: &Path) -> Option<PathBuf> {
    let labels_path = model_path.with_extension("labels.txt");
    if labels_path.exists() {
        return Some(labels_path);
    }
    if let Some(stem) = model_path.file_stem().and_then(|s| s.to_str()) {
        let fallback = Path::new("models").join(format!("{stem}.labels.txt"));
        if fallback.exists() {
            return Some(fallback);
        }
    }
    None
}

pub fn load_labels(labels_path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(labels_path)?;
    let labels = parse_labels(&contents);
    if labels.is_empty() {
        return Err(Error::Config(format!(
            "Labels file is empty or invalid: {}",
            labels_path.display()
        )));
    }
    log::info!("Loaded {} labels from {}", labels.len(), labels_path.display());
    Ok(labels)
}

pub fn load_labels_for_model(model_path: &Path, explicit: Option<&Path>) -> Result<Vec<String>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => resolve_labels_path(model_path).ok_or_else(|| {
            Error::Config(format!(
                "No labels sidecar found for model: {}",
                model_path.display()
            ))
        })?,
    };
    load_labels(&path)
}

/// One label per non-blank line, in class-index order. Lines starting with `#` are skipped.
///
/// A `N:` prefix is dropped only when `N` is the line's own class index, so
/// labels such as "3 bean salad" are kept as written.
pub fn parse_labels(contents: &str) -> Vec<String> {
    let mut labels = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let label = strip_index_prefix(line, labels.len()).unwrap_or(line);
        labels.push(label.to_string());
    }
    labels
}

fn strip_index_prefix(line: &str, index: usize) -> Option<&str> {
    let (prefix, rest) = line.split_once(':')?;
    let rest = rest.trim();
    if rest.is_empty() || prefix.parse::<usize>().ok()? != index {
        return None;
    }
    Some(rest)
}
