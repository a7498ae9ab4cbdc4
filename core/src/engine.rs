use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::index::InvertedIndex;
use crate::model::{Ranker, ScoringModel};
use crate::persist;
use crate::{DocId, FeatureId, Score};
use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// First id handed out for documents and features. 0 and 1 stay unused so
/// snapshots keep the same id space as older builds.
pub const DOC_START_ID: DocId = 2;
pub const FEATURE_START_ID: FeatureId = 2;

/// Field separator for [`SearchEngine::read_tsv`].
pub const DELIMITER: char = '\t';

/// Dead ids stepped over one at a time before the oldest-document pointer
/// falls back to a scan of the live ids.
const ADVANCE_SCAN: usize = 64;

/// Maps external string ids onto dense integer ids and ties candidate
/// retrieval (inverted index) to ranking (scoring model).
///
/// The engine does no locking of its own: mutations (`add_document`,
/// `delete_document`, `clear`, `load`) need exclusive access, reads
/// (`size`, searches, `save`) can share it.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    config: EngineConfig,
    model: ScoringModel,
    index: InvertedIndex,
    next_feature_id: FeatureId,
    next_document_id: DocId,
    oldest_document_id: DocId,
    doc_names: HashMap<DocId, String>,
    doc_ids: HashMap<String, DocId>,
    feature_ids: HashMap<String, FeatureId>,
}

impl Default for SearchEngine {
    fn default() -> Self { Self::new(EngineConfig::default()) }
}

impl SearchEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            model: ScoringModel::new(Ranker::from_config(&config)),
            index: InvertedIndex::new(config.max_posting),
            config,
            next_feature_id: FEATURE_START_ID,
            next_document_id: DOC_START_ID,
            oldest_document_id: DOC_START_ID,
            doc_names: HashMap::new(),
            doc_ids: HashMap::new(),
            feature_ids: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn model(&self) -> &ScoringModel { &self.model }

    pub fn index(&self) -> &InvertedIndex { &self.index }

    /// Number of live documents.
    pub fn size(&self) -> u64 { self.model.size() as u64 }

    pub fn is_empty(&self) -> bool { self.model.is_empty() }

    pub fn contains(&self, name: &str) -> bool { self.doc_ids.contains_key(name) }

    pub fn document_id(&self, name: &str) -> Option<DocId> { self.doc_ids.get(name).copied() }

    pub fn feature_id(&self, name: &str) -> Option<FeatureId> { self.feature_ids.get(name).copied() }

    pub fn oldest_document_id(&self) -> DocId { self.oldest_document_id }

    /// Feature strings currently stored for `name`, in feature id order.
    pub fn features_of(&self, name: &str) -> Vec<String> {
        let Some(id) = self.document_id(name) else { return Vec::new() };
        let wanted: BTreeSet<FeatureId> = self.model.features(id).into_iter().collect();
        let mut named: Vec<(FeatureId, &String)> = self
            .feature_ids
            .iter()
            .filter(|(_, fid)| wanted.contains(fid))
            .map(|(s, fid)| (*fid, s))
            .collect();
        named.sort_unstable();
        named.into_iter().map(|(_, s)| s.clone()).collect()
    }

    /// Drop every document and mapping and restart both id counters.
    pub fn clear(&mut self) {
        self.model.clear();
        self.index.clear();
        self.doc_names.clear();
        self.doc_ids.clear();
        self.feature_ids.clear();
        self.next_feature_id = FEATURE_START_ID;
        self.next_document_id = DOC_START_ID;
        self.oldest_document_id = DOC_START_ID;
    }

    /// Resolve feature strings to ids (assigning new ones), ascending and
    /// without duplicates. Empty strings are skipped.
    fn resolve_features<S: AsRef<str>>(&mut self, features: &[S]) -> Vec<FeatureId> {
        let mut ids = Vec::with_capacity(features.len());
        for f in features {
            let f = f.as_ref();
            if f.is_empty() { continue; }
            let id = match self.feature_ids.get(f) {
                Some(&id) => id,
                None => {
                    let Some(next) = self.next_feature_id.checked_add(1) else {
                        warn!(feature = f, "feature id space exhausted, skipping feature");
                        continue;
                    };
                    let id = std::mem::replace(&mut self.next_feature_id, next);
                    self.feature_ids.insert(f.to_string(), id);
                    id
                }
            };
            ids.push(id);
        }
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn at_capacity(&self) -> bool {
        self.config.max_documents > 0 && self.model.size() >= self.config.max_documents
    }

    /// Move `oldest_document_id` forward to the smallest live id, or to the
    /// id counter when no document is live.
    fn advance_oldest(&mut self) {
        for _ in 0..ADVANCE_SCAN {
            if self.oldest_document_id >= self.next_document_id
                || self.doc_names.contains_key(&self.oldest_document_id)
            {
                return;
            }
            self.oldest_document_id += 1;
        }
        self.oldest_document_id = self.smallest_live_id();
    }

    fn smallest_live_id(&self) -> DocId {
        self.doc_names.keys().min().copied().unwrap_or(self.next_document_id)
    }

    /// Remove the oldest live document everywhere. Returns false when
    /// nothing was left to evict.
    fn evict_oldest(&mut self) -> bool {
        self.advance_oldest();
        let id = self.oldest_document_id;
        let Some(name) = self.doc_names.remove(&id) else { return false };
        self.doc_ids.remove(&name);
        if let Some(features) = self.model.delete_document(id) {
            self.index.delete_document(id, &features);
        }
        debug!(doc_id = id, name = %name, "evicted oldest document");
        self.oldest_document_id += 1;
        self.advance_oldest();
        true
    }

    /// Add `name` with `features`, or replace its features if it already
    /// exists. Empty names and feature lists are ignored. A new document at
    /// capacity first evicts the oldest one.
    pub fn add_document<S: AsRef<str>>(&mut self, name: &str, features: &[S]) {
        if name.is_empty() || features.is_empty() { return; }
        let feature_ids = self.resolve_features(features);
        if feature_ids.is_empty() { return; }

        if let Some(&id) = self.doc_ids.get(name) {
            let old = self.model.features(id);
            self.index.delete_document(id, &old);
            self.model.add_document(id, &feature_ids);
            self.index.add_document(id, &feature_ids);
            debug!(doc_id = id, name, features = feature_ids.len(), "updated document");
            return;
        }

        // updates above never evict; only a new document makes room
        let Some(next) = self.next_document_id.checked_add(1) else {
            warn!(name, "document id space exhausted, ignoring document");
            return;
        };
        while self.at_capacity() {
            if !self.evict_oldest() { break; }
        }
        let id = std::mem::replace(&mut self.next_document_id, next);
        self.doc_ids.insert(name.to_string(), id);
        self.doc_names.insert(id, name.to_string());
        self.model.add_document(id, &feature_ids);
        self.index.add_document(id, &feature_ids);
    }

    pub fn delete_document(&mut self, name: &str) {
        let Some(&id) = self.doc_ids.get(name) else { return };
        if id == self.oldest_document_id {
            self.evict_oldest();
            return;
        }
        if let Some(features) = self.model.delete_document(id) {
            self.index.delete_document(id, &features);
        }
        self.doc_names.remove(&id);
        self.doc_ids.remove(name);
    }

    fn named(&self, ranked: Vec<(DocId, Score)>) -> Vec<(String, Score)> {
        ranked
            .into_iter()
            .filter_map(|(id, score)| self.doc_names.get(&id).map(|name| (name.clone(), score)))
            .collect()
    }

    /// Documents most similar to the given query documents. Unknown names
    /// are dropped; if none are known the result is empty.
    pub fn search_by_document<S: AsRef<str>>(&self, queries: &[S], max: usize) -> Vec<(String, Score)> {
        let ids: Vec<DocId> = queries.iter().filter_map(|q| self.document_id(q.as_ref())).collect();
        if ids.is_empty() { return Vec::new(); }
        let features: BTreeSet<FeatureId> = ids.iter().flat_map(|&id| self.model.features(id)).collect();
        let features: Vec<FeatureId> = features.into_iter().collect();
        let candidates = self.index.lookup(&features, self.config.max_candidates);
        self.named(self.model.search_by_document(&ids, &candidates, max))
    }

    /// Documents best matching the given feature strings.
    pub fn search_by_feature<S: AsRef<str>>(&self, queries: &[S], max: usize) -> Vec<(String, Score)> {
        let features: BTreeSet<FeatureId> = queries.iter().filter_map(|q| self.feature_id(q.as_ref())).collect();
        if features.is_empty() { return Vec::new(); }
        let features: Vec<FeatureId> = features.into_iter().collect();
        let candidates = self.index.lookup(&features, self.config.max_candidates);
        self.named(self.model.search_by_feature(&features, &candidates, max))
    }

    /// Add every `name<TAB>feature<TAB>...` line; returns how many lines
    /// carried a document.
    pub fn read_tsv<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut added = 0;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            let mut fields = line.split(DELIMITER);
            let Some(name) = fields.next() else { continue };
            let features: Vec<&str> = fields.filter(|f| !f.is_empty()).collect();
            if name.is_empty() || features.is_empty() { continue; }
            self.add_document(name, &features);
            added += 1;
        }
        Ok(added)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut w = persist::create_snapshot(path)?;
        self.write_to(&mut w)?;
        w.flush()?;
        info!(path = %path.display(), documents = self.size(), features = self.feature_ids.len(), postings = self.index.len(), "saved snapshot");
        Ok(())
    }

    /// Replace the current state with the snapshot at `path`. On error the
    /// engine is left untouched.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut r = persist::open_snapshot(path)?;
        let mut loaded = self.decode_snapshot(&mut r)?;
        persist::expect_eof(&mut r)?;
        loaded.enforce_capacity();
        *self = loaded;
        info!(path = %path.display(), documents = self.size(), features = self.feature_ids.len(), postings = self.index.len(), "loaded snapshot");
        Ok(())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        persist::write_u64(w, self.next_feature_id)?;
        persist::write_u64(w, self.next_document_id)?;
        persist::write_u64(w, self.oldest_document_id)?;
        persist::write_u64(w, self.config.max_documents as u64)?;
        self.model.write_to(w)?;
        self.index.write_to(w)?;

        let mut names: Vec<(&DocId, &String)> = self.doc_names.iter().collect();
        names.sort_unstable();
        persist::write_u64(w, names.len() as u64)?;
        for (id, name) in names {
            persist::write_u64(w, *id)?;
            persist::write_str(w, name)?;
        }
        for map in [&self.feature_ids, &self.doc_ids] {
            let mut entries: Vec<(&String, &u64)> = map.iter().collect();
            entries.sort_unstable();
            persist::write_u64(w, entries.len() as u64)?;
            for (name, id) in entries {
                persist::write_str(w, name)?;
                persist::write_u64(w, *id)?;
            }
        }
        Ok(())
    }

    /// Like [`load`](Self::load) but from any reader; bytes after the
    /// snapshot are left unread.
    pub fn read_from<R: Read>(&mut self, r: &mut R) -> Result<()> {
        let mut loaded = self.decode_snapshot(r)?;
        loaded.enforce_capacity();
        *self = loaded;
        Ok(())
    }

    fn enforce_capacity(&mut self) {
        let cap = self.config.max_documents;
        if cap == 0 || self.model.size() <= cap { return; }
        warn!(documents = self.model.size(), max_documents = cap, "snapshot exceeds capacity, evicting oldest documents");
        while self.model.size() > cap {
            if !self.evict_oldest() { break; }
        }
    }

    /// Build a fresh engine from a snapshot, keeping this engine's
    /// configuration except for the posting cap, which the snapshot carries.
    fn decode_snapshot<R: Read>(&self, r: &mut R) -> Result<Self> {
        let next_feature_id = persist::read_u64(r)?;
        let next_document_id = persist::read_u64(r)?;
        let oldest_document_id = persist::read_u64(r)?;
        let saved_max_documents = persist::read_u64(r)?;
        check_counter("feature", next_feature_id, FEATURE_START_ID)?;
        check_counter("document", next_document_id, DOC_START_ID)?;
        if oldest_document_id < DOC_START_ID || oldest_document_id > next_document_id {
            return Err(Error::corrupt(format!(
                "oldest document {oldest_document_id} outside {DOC_START_ID}..={next_document_id}"
            )));
        }
        if saved_max_documents != self.config.max_documents as u64 {
            debug!(saved = saved_max_documents, configured = self.config.max_documents, "ignoring saved capacity");
        }
        let model = ScoringModel::read_from(r, self.model.ranker())?;
        let index = InvertedIndex::read_from(r)?;

        let mut doc_names = HashMap::new();
        for _ in 0..persist::read_u64(r)? {
            let id = persist::read_u64(r)?;
            let name = persist::read_string(r, "document name")?;
            if !model.contains(id) {
                return Err(Error::corrupt(format!("name '{name}' refers to unknown document {id}")));
            }
            if doc_names.insert(id, name).is_some() {
                return Err(Error::corrupt(format!("document {id} named twice")));
            }
        }
        let mut feature_ids = HashMap::new();
        for _ in 0..persist::read_u64(r)? {
            let name = persist::read_string(r, "feature name")?;
            let id = persist::read_u64(r)?;
            if id >= next_feature_id {
                return Err(Error::corrupt(format!("feature id {id} beyond counter {next_feature_id}")));
            }
            if feature_ids.insert(name, id).is_some() {
                return Err(Error::corrupt("feature name mapped twice"));
            }
        }
        let mut doc_ids = HashMap::new();
        for _ in 0..persist::read_u64(r)? {
            let name = persist::read_string(r, "document name")?;
            let id = persist::read_u64(r)?;
            if doc_names.get(&id) != Some(&name) {
                return Err(Error::corrupt(format!("document maps disagree on '{name}'")));
            }
            if doc_ids.insert(name, id).is_some() {
                return Err(Error::corrupt("document name mapped twice"));
            }
        }
        if doc_names.len() != model.size() || doc_ids.len() != model.size() {
            return Err(Error::corrupt(format!(
                "{} documents but {} ids and {} names",
                model.size(),
                doc_names.len(),
                doc_ids.len()
            )));
        }

        let mut live: HashMap<DocId, Vec<FeatureId>> = HashMap::with_capacity(model.size());
        for id in model.document_ids() {
            if id >= next_document_id {
                return Err(Error::corrupt(format!("document id {id} beyond counter {next_document_id}")));
            }
            let features = model.features(id);
            if let Some(&last) = features.last() {
                if last >= next_feature_id {
                    return Err(Error::corrupt(format!("document {id} carries feature {last} beyond counter {next_feature_id}")));
                }
            }
            live.insert(id, features);
        }
        // every posting must be removable through its document's feature set
        for (feature, plist) in index.iter() {
            for doc in plist.list() {
                let carried = live.get(&doc).is_some_and(|fs| fs.binary_search(&feature).is_ok());
                if !carried {
                    return Err(Error::corrupt(format!("posting list {feature} holds document {doc} which does not carry it")));
                }
            }
        }

        let mut config = self.config.clone();
        config.max_posting = index.max_posting();
        let mut engine = Self {
            config,
            model,
            index,
            next_feature_id,
            next_document_id,
            oldest_document_id,
            doc_names,
            doc_ids,
            feature_ids,
        };
        engine.oldest_document_id = engine.smallest_live_id();
        if engine.oldest_document_id != oldest_document_id {
            debug!(saved = oldest_document_id, resolved = engine.oldest_document_id, "moved oldest document pointer to smallest live id");
        }
        Ok(engine)
    }
}

/// Id counters must lie past the reserved ids and leave room for one more id.
fn check_counter(what: &str, counter: u64, start: u64) -> Result<()> {
    if counter < start || counter == u64::MAX {
        return Err(Error::corrupt(format!("{what} id counter {counter} out of range")));
    }
    Ok(())
}
