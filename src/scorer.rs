//! Merge-probability scoring for unification graph edges.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::graph::{EdgeFeatures, FEATURE_COUNT, UnificationGraph, pair_slot};

/// Turns an edge's feature vector into the probability that both ends
/// name the same character.
pub trait EdgeScorer {
    fn score(&self, features: &EdgeFeatures) -> f64;
}

impl<F> EdgeScorer for F
where
    F: Fn(&EdgeFeatures) -> f64,
{
    fn score(&self, features: &EdgeFeatures) -> f64 {
        self(features)
    }
}

// ── Feed-forward model ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Layer {
    /// `weights[out][in]`
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl Layer {
    fn inputs(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ModelFile {
    layers: Vec<Layer>,
}

/// Dense network read from JSON: ReLU hidden layers, one sigmoid output.
/// A single layer is plain logistic regression.
#[derive(Debug, Clone)]
pub struct MlpScorer {
    layers: Vec<Layer>,
}

impl MlpScorer {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::scorer(path, e))?;
        let model: ModelFile = serde_json::from_str(&raw).map_err(|e| Error::scorer(path, e))?;
        let scorer = Self::from_layers(model.layers).map_err(|reason| Error::scorer(path, reason))?;
        tracing::info!(layers = scorer.layers.len(), "edge scorer loaded from {}", path.display());
        Ok(scorer)
    }

    /// Checks that the layer shapes chain from the feature vector down to a
    /// single output.
    pub fn from_layers(layers: Vec<Layer>) -> std::result::Result<Self, String> {
        if layers.is_empty() {
            return Err("model has no layers".into());
        }
        let mut width = FEATURE_COUNT;
        for (i, layer) in layers.iter().enumerate() {
            if layer.weights.is_empty() || layer.weights.len() != layer.bias.len() {
                return Err(format!("layer {i}: weight rows and bias lengths differ"));
            }
            if layer.weights.iter().any(|row| row.len() != width) || layer.inputs() != width {
                return Err(format!("layer {i}: expected {width} inputs"));
            }
            width = layer.weights.len();
        }
        if width != 1 {
            return Err(format!("model must end in one output, found {width}"));
        }
        Ok(MlpScorer { layers })
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl EdgeScorer for MlpScorer {
    fn score(&self, features: &EdgeFeatures) -> f64 {
        let mut activation: Vec<f64> = features.to_array().iter().map(|&f| f as f64).collect();
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            activation = layer.forward(&activation);
            if i < last {
                activation.iter_mut().for_each(|a| *a = a.max(0.0));
            }
        }
        activation.first().copied().map_or(0.0, sigmoid)
    }
}

// ── Scored graph ───────────────────────────────────────────────────

/// Merge probability of every unordered node pair.
#[derive(Debug, Clone)]
pub struct EdgeProbabilities {
    n: usize,
    probs: Vec<f64>,
}

impl EdgeProbabilities {
    pub fn score(graph: &UnificationGraph, scorer: &dyn EdgeScorer) -> Self {
        let n = graph.node_count();
        let probs = graph
            .pairs()
            .map(|(i, j)| {
                let p = scorer.score(graph.edge(i, j));
                if p.is_nan() {
                    tracing::warn!(a = %graph.node(i).text, b = %graph.node(j).text, "scorer returned NaN, using 0");
                    0.0
                } else {
                    p.clamp(0.0, 1.0)
                }
            })
            .collect();
        tracing::info!(edges = n * n.saturating_sub(1) / 2, "edges scored");
        EdgeProbabilities { n, probs }
    }

    /// From a full `n × n` table; only the upper triangle is read.
    pub fn from_matrix(matrix: &[Vec<f64>]) -> Self {
        let n = matrix.len();
        let mut probs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for (i, row) in matrix.iter().enumerate() {
            probs.extend(row.iter().skip(i + 1).copied());
        }
        EdgeProbabilities { n, probs }
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return 1.0;
        }
        self.probs.get(pair_slot(self.n, i, j)).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logistic(weights: [f64; FEATURE_COUNT], bias: f64) -> MlpScorer {
        MlpScorer::from_layers(vec![Layer {
            weights: vec![weights.to_vec()],
            bias: vec![bias],
        }])
        .unwrap()
    }

    #[test]
    fn test_logistic_model() {
        let scorer = logistic([0.0; FEATURE_COUNT], 0.0);
        assert!((scorer.score(&EdgeFeatures::default()) - 0.5).abs() < 1e-12);

        let mut w = [0.0; FEATURE_COUNT];
        w[0] = 2.0;
        let scorer = logistic(w, -2.0);
        let features = EdgeFeatures {
            coref_connected: 3,
            ..EdgeFeatures::default()
        };
        assert!((scorer.score(&features) - sigmoid(4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_hidden_layer_relu() {
        let mut w = vec![0.0; FEATURE_COUNT];
        w[6] = -1.0;
        let scorer = MlpScorer::from_layers(vec![
            Layer {
                weights: vec![w],
                bias: vec![0.0],
            },
            Layer {
                weights: vec![vec![1.0]],
                bias: vec![0.0],
            },
        ])
        .unwrap();
        let features = EdgeFeatures {
            name_subset: 1,
            ..EdgeFeatures::default()
        };
        // -1 clipped to 0 by ReLU, then sigmoid(0)
        assert!((scorer.score(&features) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = MlpScorer::from_layers(vec![Layer {
            weights: vec![vec![1.0; 3]],
            bias: vec![0.0],
        }])
        .unwrap_err();
        assert!(err.contains("expected 10 inputs"));
        assert!(MlpScorer::from_layers(vec![]).is_err());
    }

    #[test]
    fn test_load_failures_are_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = MlpScorer::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(missing, Error::ScorerUnavailable { .. }));

        let corrupt = dir.path().join("model.json");
        fs::write(&corrupt, "{\"layers\": [").unwrap();
        assert!(MlpScorer::load(&corrupt).unwrap_err().is_configuration());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let weights = vec![0.5; FEATURE_COUNT];
        let json = serde_json::json!({ "layers": [{ "weights": [weights], "bias": [0.0] }] });
        fs::write(&path, json.to_string()).unwrap();
        let scorer = MlpScorer::load(&path).unwrap();
        assert!(scorer.score(&EdgeFeatures::default()) > 0.49);
    }

    #[test]
    fn test_closure_scorer_and_matrix() {
        let scorer = |f: &EdgeFeatures| if f.name_subset > 0 { 0.95 } else { 0.0 };
        assert_eq!(
            scorer.score(&EdgeFeatures {
                name_subset: 1,
                ..EdgeFeatures::default()
            }),
            0.95
        );

        let probs = EdgeProbabilities::from_matrix(&[
            vec![1.0, 0.8, 0.05],
            vec![0.8, 1.0, 0.7],
            vec![0.05, 0.7, 1.0],
        ]);
        assert_eq!(probs.get(0, 1), 0.8);
        assert_eq!(probs.get(2, 0), 0.05);
        assert_eq!(probs.get(1, 2), 0.7);
    }
}
