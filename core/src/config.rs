use crate::index::MAX_LOOKUP;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default smoothing constant `c` of the Bayesian-Sets model.
pub const DEFAULT_BAYES_C: f64 = 2.0;
/// Default cap on each posting list.
pub const DEFAULT_MAX_POSTING: usize = 100;

/// Ranking strategy, fixed when the engine is built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    #[default]
    InnerProduct,
    Cosine,
    BayesianSets,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::InnerProduct => "inner-product",
            ModelKind::Cosine => "cosine",
            ModelKind::BayesianSets => "bayesian-sets",
        };
        f.write_str(name)
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner-product" | "inner_product" | "ip" => Ok(ModelKind::InnerProduct),
            "cosine" | "cos" => Ok(ModelKind::Cosine),
            "bayesian-sets" | "bayesian_sets" | "bs" => Ok(ModelKind::BayesianSets),
            other => Err(format!("unknown model '{other}' (expected inner-product, cosine or bayesian-sets)")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub model: ModelKind,
    /// Smoothing constant, only read by [`ModelKind::BayesianSets`].
    pub bayes_c: f64,
    /// Cap on every posting list, 0 = unbounded.
    pub max_posting: usize,
    /// Corpus capacity, 0 = unbounded.
    pub max_documents: usize,
    /// Candidate cutoff for inverted index lookups.
    pub max_candidates: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            bayes_c: DEFAULT_BAYES_C,
            max_posting: DEFAULT_MAX_POSTING,
            max_documents: 0,
            max_candidates: MAX_LOOKUP,
        }
    }
}

impl EngineConfig {
    pub fn with_model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    pub fn with_max_posting(mut self, max: usize) -> Self {
        self.max_posting = max;
        self
    }

    pub fn with_max_documents(mut self, max: usize) -> Self {
        self.max_documents = max;
        self
    }
}
