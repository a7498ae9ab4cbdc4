use simdex::engine::{DOC_START_ID, FEATURE_START_ID};
use simdex::{codec, persist, SearchEngine};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::{Duration, Instant};

/// Hand-built snapshot, written field by field in the on-disk layout.
struct Snapshot {
    next_feature: u64,
    next_document: u64,
    oldest: u64,
    /// (doc id, name, ascending features)
    docs: Vec<(u64, &'static str, Vec<u64>)>,
    features: Vec<(&'static str, u64)>,
    /// (feature, ascending doc ids)
    postings: Vec<(u64, Vec<u64>)>,
}

impl Snapshot {
    fn empty(next_document: u64) -> Self {
        Self {
            next_feature: FEATURE_START_ID,
            next_document,
            oldest: DOC_START_ID,
            docs: Vec::new(),
            features: Vec::new(),
            postings: Vec::new(),
        }
    }

    /// Two documents sharing feature 2, with a wide gap between their ids.
    fn sparse(far: u64) -> Self {
        Self {
            next_feature: 3,
            next_document: far + 1,
            oldest: DOC_START_ID,
            docs: vec![(DOC_START_ID, "a", vec![2]), (far, "b", vec![2])],
            features: vec![("x", 2)],
            postings: vec![(2, vec![DOC_START_ID, far])],
        }
    }

    fn bytes(&self) -> Vec<u8> {
        let mut w = Vec::new();
        for v in [self.next_feature, self.next_document, self.oldest, 0] {
            persist::write_u64(&mut w, v).unwrap();
        }
        let mut freq: BTreeMap<u64, i32> = BTreeMap::new();
        persist::write_u64(&mut w, self.docs.len() as u64).unwrap();
        for (id, _, features) in &self.docs {
            persist::write_u64(&mut w, *id).unwrap();
            persist::write_bytes(&mut w, &codec::encode(features)).unwrap();
            for f in features {
                *freq.entry(*f).or_insert(0) += 1;
            }
        }
        persist::write_u64(&mut w, freq.len() as u64).unwrap();
        for (f, count) in &freq {
            persist::write_u64(&mut w, *f).unwrap();
            persist::write_i32(&mut w, *count).unwrap();
        }
        persist::write_u64(&mut w, 100).unwrap();
        persist::write_u64(&mut w, self.postings.len() as u64).unwrap();
        for (f, docs) in &self.postings {
            persist::write_u64(&mut w, *f).unwrap();
            persist::write_bytes(&mut w, &codec::encode(docs)).unwrap();
        }
        persist::write_u64(&mut w, self.docs.len() as u64).unwrap();
        for (id, name, _) in &self.docs {
            persist::write_u64(&mut w, *id).unwrap();
            persist::write_str(&mut w, name).unwrap();
        }
        persist::write_u64(&mut w, self.features.len() as u64).unwrap();
        for (name, id) in &self.features {
            persist::write_str(&mut w, name).unwrap();
            persist::write_u64(&mut w, *id).unwrap();
        }
        persist::write_u64(&mut w, self.docs.len() as u64).unwrap();
        for (id, name, _) in &self.docs {
            persist::write_str(&mut w, name).unwrap();
            persist::write_u64(&mut w, *id).unwrap();
        }
        w
    }

    fn load(&self) -> simdex::Result<SearchEngine> {
        let mut e = SearchEngine::default();
        e.read_from(&mut Cursor::new(self.bytes()))?;
        Ok(e)
    }
}

fn assert_corrupt(snapshot: &Snapshot) {
    let err = snapshot.load().unwrap_err();
    assert!(err.is_corruption(), "{err}");
}

#[test]
fn hand_built_snapshot_loads() {
    let e = Snapshot::sparse(9).load().unwrap();
    assert_eq!(e.size(), 2);
    assert_eq!(e.search_by_feature(&["x"], 10).len(), 2);
}

#[test]
fn huge_counter_with_empty_corpus_loads_immediately() {
    let counter = 1u64 << 62;
    let started = Instant::now();
    let mut e = Snapshot::empty(counter).load().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(e.oldest_document_id(), counter);

    e.add_document("a", &["x"]);
    assert_eq!(e.document_id("a"), Some(counter));
    assert_eq!(e.oldest_document_id(), counter);
}

#[test]
fn wide_id_gap_is_skipped_on_eviction() {
    let far = 1u64 << 40;
    let mut e = Snapshot::sparse(far).load().unwrap();
    assert_eq!(e.oldest_document_id(), DOC_START_ID);

    let started = Instant::now();
    e.delete_document("a");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(e.oldest_document_id(), far);

    e.delete_document("b");
    assert_eq!(e.oldest_document_id(), far + 1);
    assert!(e.is_empty());
}

#[test]
fn saved_oldest_pointer_is_resolved_to_smallest_live_id() {
    let mut s = Snapshot::sparse(40);
    s.oldest = 30;
    let e = s.load().unwrap();
    assert_eq!(e.oldest_document_id(), DOC_START_ID);
}

#[test]
fn out_of_range_counters_are_rejected() {
    assert_corrupt(&Snapshot::empty(u64::MAX));
    assert_corrupt(&Snapshot::empty(DOC_START_ID - 1));

    let mut s = Snapshot::empty(10);
    s.next_feature = u64::MAX;
    assert_corrupt(&s);
    s.next_feature = 0;
    assert_corrupt(&s);

    let mut s = Snapshot::empty(10);
    s.oldest = 11;
    assert_corrupt(&s);
    s.oldest = 0;
    assert_corrupt(&s);
}

#[test]
fn ids_beyond_counters_are_rejected() {
    let mut s = Snapshot::sparse(9);
    s.next_document = 9;
    assert_corrupt(&s);

    let mut s = Snapshot::sparse(9);
    s.next_feature = 2;
    s.features.clear();
    assert_corrupt(&s);
}

#[test]
fn postings_must_match_document_features() {
    // posting for a document that is not live
    let mut s = Snapshot::sparse(9);
    s.postings = vec![(2, vec![DOC_START_ID, 5, 9])];
    assert_corrupt(&s);

    // posting under a feature the document does not carry
    let mut s = Snapshot::sparse(9);
    s.next_feature = 4;
    s.postings.push((3, vec![9]));
    assert_corrupt(&s);
}

#[test]
fn exhausted_counter_never_wraps() {
    let mut e = Snapshot::empty(u64::MAX - 1).load().unwrap();
    e.add_document("a", &["x"]);
    assert_eq!(e.document_id("a"), Some(u64::MAX - 1));
    e.add_document("b", &["y"]);
    assert!(!e.contains("b"));
    assert_eq!(e.size(), 1);
}
