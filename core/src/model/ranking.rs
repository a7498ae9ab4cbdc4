//! The three ranking strategies. Each turns a query vector into per-feature
//! weights against the current corpus statistics, scores candidates, and
//! keeps the best `max` by score (ties go to the larger document id).

use super::{QueryVector, ScoringModel};
use crate::config::{EngineConfig, ModelKind, DEFAULT_BAYES_C};
use crate::{DocId, FeatureId, Score};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Ranker {
    /// Log-odds that a document's features come from the same process as
    /// the query set, relative to corpus-wide frequency. `c` smooths the
    /// per-feature Beta prior.
    BayesianSets { c: Score },
    /// IDF-weighted overlap; each shared feature contributes the square of
    /// its weighted query value.
    #[default]
    InnerProduct,
    /// IDF-weighted, L2-normalised query against the document's own IDF norm.
    Cosine,
}

impl Ranker {
    pub fn from_kind(kind: ModelKind, c: Score) -> Self {
        match kind {
            ModelKind::InnerProduct => Ranker::InnerProduct,
            ModelKind::Cosine => Ranker::Cosine,
            ModelKind::BayesianSets => Ranker::BayesianSets { c },
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self { Self::from_kind(cfg.model, cfg.bayes_c) }

    pub fn bayesian_sets() -> Self { Ranker::BayesianSets { c: DEFAULT_BAYES_C } }

    pub fn kind(&self) -> ModelKind {
        match self {
            Ranker::BayesianSets { .. } => ModelKind::BayesianSets,
            Ranker::InnerProduct => ModelKind::InnerProduct,
            Ranker::Cosine => ModelKind::Cosine,
        }
    }

    /// `num_queries` is the number of query documents behind `query`
    /// (1 for a feature query).
    pub(crate) fn rank(
        &self,
        model: &ScoringModel,
        mut query: QueryVector,
        num_queries: usize,
        candidates: &[DocId],
        max: usize,
    ) -> Vec<(DocId, Score)> {
        let scored = match *self {
            Ranker::BayesianSets { c } => {
                let weights = bayes_weights(model, &query, num_queries, c);
                score_candidates(model, candidates, |features| {
                    Some(features.iter().filter_map(|f| weights.get(f)).sum())
                })
            }
            Ranker::InnerProduct => {
                apply_idf(model, &mut query);
                score_candidates(model, candidates, |features| {
                    Some(features.iter().filter_map(|f| query.get(f)).map(|w| w * w).sum())
                })
            }
            Ranker::Cosine => {
                apply_idf(model, &mut query);
                normalize(&mut query);
                score_candidates(model, candidates, |features| {
                    let mut score = 0.0;
                    let mut norm = 0.0;
                    for f in features {
                        if let Some(val) = idf(model, *f) {
                            norm += val * val;
                            if let Some(q) = query.get(f) {
                                score += val * q;
                            }
                        }
                    }
                    (norm != 0.0).then(|| score / norm.sqrt())
                })
            }
        };
        top_k(scored, max)
    }
}

/// `ln(N / df) + 1` with `N / df` floored, or `None` for features no live
/// document carries.
fn idf(model: &ScoringModel, feature: FeatureId) -> Option<Score> {
    let df = model.document_frequency(feature);
    if df <= 0 {
        return None;
    }
    let ratio = model.size() as u64 / df as u64;
    Some((ratio as Score).ln() + 1.0)
}

fn apply_idf(model: &ScoringModel, query: &mut QueryVector) {
    for (f, w) in query.iter_mut() {
        if let Some(val) = idf(model, *f) {
            *w *= val;
        }
    }
}

fn normalize(query: &mut QueryVector) {
    let norm = query.values().map(|w| w * w).sum::<Score>().sqrt();
    if norm > 0.0 {
        for w in query.values_mut() {
            *w /= norm;
        }
    }
}

fn bayes_weights(model: &ScoringModel, query: &QueryVector, num_queries: usize, c: Score) -> HashMap<FeatureId, Score> {
    let n = model.size() as Score;
    let nq = num_queries as Score;
    let mut weights = HashMap::with_capacity(query.len());
    for (&f, &q) in query {
        let df = model.document_frequency(f);
        if df <= 0 {
            continue;
        }
        let mean = df as Score / n;
        let alpha = (1.0 + q / (c * mean)).ln();
        let beta = if mean == 1.0 { 0.0 } else { (1.0 + (nq - q) / (c * (1.0 - mean))).ln() };
        let weight = alpha - beta;
        if weight.is_finite() && weight != 0.0 {
            weights.insert(f, weight);
        }
    }
    weights
}

/// Score every known candidate; unknown ids, `None` and zero scores are dropped.
fn score_candidates<F>(model: &ScoringModel, candidates: &[DocId], mut score: F) -> Vec<(DocId, Score)>
where
    F: FnMut(&[FeatureId]) -> Option<Score>,
{
    let mut scored = Vec::new();
    for &doc in candidates {
        let Some(features) = model.decoded(doc) else { continue };
        match score(&features) {
            Some(s) if s != 0.0 && !s.is_nan() => scored.push((doc, s)),
            _ => {}
        }
    }
    scored
}

/// Score descending, then document id descending.
pub fn by_score_desc(a: &(DocId, Score), b: &(DocId, Score)) -> Ordering {
    match b.1.total_cmp(&a.1) {
        Ordering::Equal => b.0.cmp(&a.0),
        ord => ord,
    }
}

/// The best `max` entries in ranked order.
pub fn top_k(mut pairs: Vec<(DocId, Score)>, max: usize) -> Vec<(DocId, Score)> {
    if max == 0 {
        return Vec::new();
    }
    if pairs.len() > max {
        pairs.select_nth_unstable_by(max - 1, by_score_desc);
        pairs.truncate(max);
    }
    pairs.sort_unstable_by(by_score_desc);
    pairs
}
