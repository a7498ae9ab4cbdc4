//! Per-document feature storage, document-frequency bookkeeping and ranking.

pub mod ranking;

pub use ranking::Ranker;

use crate::codec;
use crate::error::{Error, Result};
use crate::persist;
use crate::{DocId, FeatureId, Score};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use tracing::debug;

/// Sparse feature -> weight vector built from a query. Ordered so that
/// norms are summed in the same order on every run.
pub type QueryVector = BTreeMap<FeatureId, Score>;

/// Owns every stored document's (compressed, ascending) feature set and the
/// number of documents carrying each feature. Frequencies always reflect the
/// full stored feature sets, independent of any posting-list cap.
#[derive(Debug, Default, Clone)]
pub struct ScoringModel {
    documents: HashMap<DocId, Vec<u8>>,
    frequencies: HashMap<FeatureId, i32>,
    ranker: Ranker,
}

impl ScoringModel {
    pub fn new(ranker: Ranker) -> Self {
        Self { documents: HashMap::new(), frequencies: HashMap::new(), ranker }
    }

    pub fn ranker(&self) -> Ranker { self.ranker }

    /// Number of stored documents.
    pub fn size(&self) -> usize { self.documents.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    pub fn contains(&self, id: DocId) -> bool { self.documents.contains_key(&id) }

    pub fn document_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.documents.keys().copied()
    }

    /// Number of distinct features with a non-zero document frequency.
    pub fn feature_count(&self) -> usize { self.frequencies.len() }

    pub fn document_frequency(&self, feature: FeatureId) -> i32 {
        self.frequencies.get(&feature).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.frequencies.clear();
    }

    /// Feature ids of `id`, ascending; empty for unknown documents.
    pub fn features(&self, id: DocId) -> Vec<FeatureId> {
        self.decoded(id).unwrap_or_default()
    }

    pub(crate) fn decoded(&self, id: DocId) -> Option<Vec<FeatureId>> {
        // stored buffers come from `codec::encode` or a validated snapshot
        self.documents.get(&id).map(|bytes| codec::decode(bytes).unwrap_or_default())
    }

    fn update_frequency(&mut self, features: &[FeatureId], delta: i32) {
        for f in features {
            let count = self.frequencies.get(f).copied().unwrap_or(0) + delta;
            if count > 0 {
                self.frequencies.insert(*f, count);
            } else {
                self.frequencies.remove(f);
            }
        }
    }

    /// Store `features` for `id`, replacing (and un-counting) any previous set.
    pub fn add_document(&mut self, id: DocId, features: &[FeatureId]) {
        let features: Cow<'_, [FeatureId]> = if features.windows(2).all(|w| w[0] < w[1]) {
            Cow::Borrowed(features)
        } else {
            let mut owned = features.to_vec();
            owned.sort_unstable();
            owned.dedup();
            Cow::Owned(owned)
        };
        if let Some(old) = self.decoded(id) {
            debug!(doc_id = id, old = old.len(), new = features.len(), "replacing document features");
            self.update_frequency(&old, -1);
        }
        self.update_frequency(&features, 1);
        self.documents.insert(id, codec::encode(&features));
    }

    /// Remove `id`, returning the feature set it had.
    pub fn delete_document(&mut self, id: DocId) -> Option<Vec<FeatureId>> {
        let bytes = self.documents.remove(&id)?;
        let features = codec::decode(&bytes).unwrap_or_default();
        self.update_frequency(&features, -1);
        Some(features)
    }

    /// Sum one unit of weight per query document carrying each feature.
    pub fn make_query_vector(&self, queries: &[DocId]) -> QueryVector {
        let mut query = QueryVector::new();
        for &q in queries {
            for f in self.features(q) {
                *query.entry(f).or_insert(0.0) += 1.0;
            }
        }
        query
    }

    pub fn feature_query_vector(features: &[FeatureId]) -> QueryVector {
        features.iter().map(|&f| (f, 1.0)).collect()
    }

    pub fn search_by_document(&self, queries: &[DocId], candidates: &[DocId], max: usize) -> Vec<(DocId, Score)> {
        let query = self.make_query_vector(queries);
        self.ranker.rank(self, query, queries.len(), candidates, max)
    }

    /// Rank every stored document against the query documents.
    pub fn search_by_document_all(&self, queries: &[DocId], max: usize) -> Vec<(DocId, Score)> {
        let candidates: Vec<DocId> = self.document_ids().collect();
        self.search_by_document(queries, &candidates, max)
    }

    pub fn search_by_feature(&self, features: &[FeatureId], candidates: &[DocId], max: usize) -> Vec<(DocId, Score)> {
        let query = Self::feature_query_vector(features);
        self.ranker.rank(self, query, 1, candidates, max)
    }

    pub fn search_by_feature_all(&self, features: &[FeatureId], max: usize) -> Vec<(DocId, Score)> {
        let candidates: Vec<DocId> = self.document_ids().collect();
        self.search_by_feature(features, &candidates, max)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut ids: Vec<&DocId> = self.documents.keys().collect();
        ids.sort_unstable();
        persist::write_u64(w, ids.len() as u64)?;
        for id in ids {
            persist::write_u64(w, *id)?;
            persist::write_bytes(w, &self.documents[id])?;
        }
        let mut features: Vec<(&FeatureId, &i32)> = self.frequencies.iter().collect();
        features.sort_unstable();
        persist::write_u64(w, features.len() as u64)?;
        for (f, count) in features {
            persist::write_u64(w, *f)?;
            persist::write_i32(w, *count)?;
        }
        Ok(())
    }

    /// Read documents and frequencies; the stored frequencies must agree
    /// with the stored feature sets.
    pub fn read_from<R: Read>(r: &mut R, ranker: Ranker) -> Result<Self> {
        let mut model = Self::new(ranker);
        let mut expected: HashMap<FeatureId, i32> = HashMap::new();
        let ndocs = persist::read_u64(r)?;
        for _ in 0..ndocs {
            let id = persist::read_u64(r)?;
            let (bytes, features) = persist::read_id_set(r, "document features")?;
            for f in features {
                *expected.entry(f).or_insert(0) += 1;
            }
            if model.documents.insert(id, bytes).is_some() {
                return Err(Error::corrupt(format!("document {id} stored twice")));
            }
        }
        let nfeatures = persist::read_u64(r)?;
        for _ in 0..nfeatures {
            let f = persist::read_u64(r)?;
            let count = persist::read_i32(r)?;
            if count <= 0 {
                return Err(Error::corrupt(format!("feature {f} has frequency {count}")));
            }
            if model.frequencies.insert(f, count).is_some() {
                return Err(Error::corrupt(format!("feature {f} counted twice")));
            }
        }
        if model.frequencies != expected {
            return Err(Error::corrupt("feature frequencies disagree with stored documents"));
        }
        Ok(model)
    }
}
