use std::fs;
use std::path::{Path, PathBuf};

use speaker_types::Corpus;
use walkdir::WalkDir;

use crate::error::Result;
use crate::graph::{FEATURE_NAMES, UnificationGraph};

pub const WEIGHTS_EXTENSION: &str = "weights";

/// Every annotated corpus (`*.json`) under `root`, or `root` itself when it
/// is a file. Sorted for stable output.
pub fn scan_corpora(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }
    let mut results: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    results.sort();
    results
}

pub fn load_corpus(path: &Path) -> Result<Corpus> {
    let raw = fs::read_to_string(path)?;
    let corpus: Corpus = serde_json::from_str(&raw)?;
    tracing::info!(units = corpus.units.len(), "corpus loaded from {}", path.display());
    Ok(corpus)
}

/// `<stem>.weights` next to the corpus file.
pub fn weights_path(corpus: &Path) -> PathBuf {
    corpus.with_extension(WEIGHTS_EXTENSION)
}

/// One CSV line per edge: both names, then the features in
/// [`FEATURE_NAMES`] order. Commas inside names are replaced by spaces.
pub fn render_weights(graph: &UnificationGraph) -> String {
    let mut out = String::new();
    out.push_str("name_a,name_b,");
    out.push_str(&FEATURE_NAMES.join(","));
    out.push('\n');
    for (a, b, features) in graph.feature_rows() {
        let values: Vec<String> = features.iter().map(u32::to_string).collect();
        out.push_str(&format!("{},{},{}\n", a.replace(',', " "), b.replace(',', " "), values.join(",")));
    }
    out
}

pub fn write_weights(corpus: &Path, graph: &UnificationGraph) -> Result<PathBuf> {
    let path = weights_path(corpus);
    fs::write(&path, render_weights(graph))?;
    Ok(path)
}
