use serde::{Deserialize, Serialize};

/// Canonical label for the merged first-person narrator.
pub const NARRATOR_NAME: &str = "(THE NARRATOR)";

/// Tunables of identity resolution (graph scoring, pruning and clustering).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Edges at or above this probability are never cut.
    pub edge_maxprob: f64,
    /// Components with fewer total occurrences are dropped as noise.
    pub character_remove_limit: usize,
    /// Pairs above this probability enter the merge graph.
    pub merge_threshold: f64,
    /// Pairs below this probability inside one component get separated.
    pub split_threshold: f64,
    /// Pronoun counts are "close" when the difference is below this share
    /// of the minority count.
    pub gender_closeness: f64,
    /// The narrator survives when its occurrences exceed this many times
    /// the number of text units.
    pub narrator_unit_ratio: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        ResolutionConfig {
            edge_maxprob: 0.9,
            character_remove_limit: 3,
            merge_threshold: 0.5,
            split_threshold: 0.1,
            gender_closeness: 0.1,
            narrator_unit_ratio: 1.0,
        }
    }
}

impl ResolutionConfig {
    /// Pronoun counts too close to call (minority within the closeness
    /// ratio of the majority). Two zero counts are not close.
    pub fn counts_close(&self, female: usize, male: usize) -> bool {
        let diff = female.abs_diff(male) as f64;
        diff < female.min(male) as f64 * self.gender_closeness
    }
}

/// Tunables of speaker attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// Tokens scanned before the first quote for candidate speakers
    pub window_before: i64,
    /// Tokens scanned after the last quote for candidate speakers
    pub window_after: i64,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        AttributionConfig {
            window_before: 2000,
            window_after: 500,
        }
    }
}
