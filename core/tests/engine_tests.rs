use simdex::engine::DOC_START_ID;
use simdex::{EngineConfig, ModelKind, SearchEngine};
use std::fs;
use tempfile::tempdir;

fn engine(kind: ModelKind, max_documents: usize) -> SearchEngine {
    SearchEngine::new(EngineConfig::default().with_model(kind).with_max_documents(max_documents))
}

fn ids(results: &[(String, f64)]) -> Vec<&str> {
    results.iter().map(|(id, _)| id.as_str()).collect()
}

const ALL_MODELS: [ModelKind; 3] = [ModelKind::InnerProduct, ModelKind::Cosine, ModelKind::BayesianSets];

#[test]
fn capacity_evicts_oldest_first() {
    let mut e = engine(ModelKind::InnerProduct, 2);
    e.add_document("A", &["x"]);
    e.add_document("B", &["y"]);
    e.add_document("C", &["z"]);
    assert_eq!(e.size(), 2);
    assert!(!e.contains("A"));
    assert!(e.search_by_feature(&["x"], 10).is_empty());
    assert_eq!(ids(&e.search_by_feature(&["y", "z"], 10)).len(), 2);
    assert_eq!(e.oldest_document_id(), DOC_START_ID + 1);
}

#[test]
fn evicted_document_no_longer_matches_shared_feature() {
    let mut e = engine(ModelKind::InnerProduct, 2);
    e.add_document("A", &["f1", "f2"]);
    e.add_document("B", &["f2", "f3"]);
    e.add_document("C", &["f1", "f3"]);
    assert_eq!(e.size(), 2);
    assert_eq!(ids(&e.search_by_feature(&["f1"], 10)), vec!["C"]);
}

#[test]
fn overfilled_corpus_forgets_oldest_documents() {
    let (k, m) = (5usize, 3usize);
    let mut e = engine(ModelKind::Cosine, k);
    for i in 0..k + m {
        e.add_document(&format!("doc{i}"), &[format!("own{i}"), "common".to_string()]);
    }
    assert_eq!(e.size(), k as u64);
    for i in 0..m {
        assert!(e.search_by_feature(&[format!("own{i}")], 10).is_empty());
        let common = e.search_by_feature(&["common"], 100);
        assert!(!ids(&common).contains(&format!("doc{i}").as_str()));
    }
    for i in m..k + m {
        assert_eq!(ids(&e.search_by_feature(&[format!("own{i}")], 10)), vec![format!("doc{i}")]);
    }
}

#[test]
fn empty_corpus_returns_nothing() {
    for kind in ALL_MODELS {
        let e = engine(kind, 0);
        assert!(e.search_by_document(&["anything"], 10).is_empty());
        assert!(e.search_by_feature(&["anything"], 10).is_empty());
        assert_eq!(e.size(), 0);
    }
}

#[test]
fn identical_documents_score_equally() {
    for kind in ALL_MODELS {
        let mut e = engine(kind, 0);
        e.add_document("a", &["x", "y", "z"]);
        e.add_document("b", &["x", "y", "z"]);
        e.add_document("c", &["z", "w"]);
        e.add_document("d", &["q"]);
        let results = e.search_by_document(&["a"], 10);
        let score_of = |id: &str| results.iter().find(|(n, _)| n == id).map(|(_, s)| *s);
        assert_eq!(score_of("a"), score_of("b"), "{kind}");
        assert!(score_of("a").is_some(), "{kind}");
        assert!(score_of("d").is_none(), "{kind}");
        // equal scores order by the newer document first
        assert_eq!(ids(&results)[..2], ["b", "a"], "{kind}");
    }
}

#[test]
fn unknown_queries_are_dropped() {
    let mut e = engine(ModelKind::InnerProduct, 0);
    e.add_document("a", &["x", "y"]);
    e.add_document("b", &["y"]);
    assert_eq!(e.search_by_document(&["nope", "a"], 10), e.search_by_document(&["a"], 10));
    assert_eq!(e.search_by_feature(&["nope", "x"], 10), e.search_by_feature(&["x"], 10));
    assert!(e.search_by_document(&["nope"], 10).is_empty());
}

#[test]
fn max_limits_result_count() {
    let mut e = engine(ModelKind::InnerProduct, 0);
    for i in 0..20 {
        e.add_document(&format!("d{i}"), &["shared"]);
    }
    assert_eq!(e.search_by_feature(&["shared"], 5).len(), 5);
    assert!(e.search_by_feature(&["shared"], 0).is_empty());
    // all tie, so the newest come first
    assert_eq!(ids(&e.search_by_feature(&["shared"], 2)), vec!["d19", "d18"]);
}

fn sorted_ids(results: &[(String, f64)]) -> Vec<&str> {
    let mut v = ids(results);
    v.sort_unstable();
    v
}

#[test]
fn candidate_cutoff_keeps_best_matching_documents() {
    let config = |max_candidates| EngineConfig { max_candidates, ..EngineConfig::default() };
    let build = |max_candidates| {
        let mut e = SearchEngine::new(config(max_candidates));
        e.add_document("a", &["x", "y", "z"]);
        e.add_document("b", &["x"]);
        e.add_document("c", &["x", "y"]);
        e.add_document("d", &["y"]);
        e
    };

    // a matches three query features, c two, b and d one each
    let e = build(2);
    assert_eq!(sorted_ids(&e.search_by_feature(&["x", "y", "z"], 10)), vec!["a", "c"]);
    assert_eq!(sorted_ids(&e.search_by_document(&["a"], 10)), vec!["a", "c"]);

    // the last slot goes to the newer of the single matches
    let e = build(3);
    assert_eq!(sorted_ids(&e.search_by_feature(&["x", "y", "z"], 10)), vec!["a", "c", "d"]);

    let e = build(1000);
    assert_eq!(e.search_by_feature(&["x", "y", "z"], 10).len(), 4);
}

#[test]
fn update_replaces_features() {
    let mut e = engine(ModelKind::InnerProduct, 0);
    e.add_document("a", &["x", "y"]);
    e.add_document("b", &["y"]);
    e.add_document("a", &["z"]);
    assert_eq!(e.size(), 2);
    assert!(e.search_by_feature(&["x"], 10).is_empty());
    assert_eq!(ids(&e.search_by_feature(&["y"], 10)), vec!["b"]);
    assert_eq!(ids(&e.search_by_feature(&["z"], 10)), vec!["a"]);
    let y = e.feature_id("y").unwrap();
    assert_eq!(e.model().document_frequency(y), 1);
}

#[test]
fn delete_removes_document_everywhere() {
    let mut e = engine(ModelKind::BayesianSets, 0);
    e.add_document("a", &["x"]);
    e.add_document("b", &["x", "y"]);
    e.delete_document("b");
    e.delete_document("never-added");
    assert_eq!(e.size(), 1);
    assert!(e.search_by_feature(&["y"], 10).is_empty());
    assert!(e.search_by_document(&["b"], 10).is_empty());
    assert!(e.index().postings(e.feature_id("y").unwrap()).is_none());
}

#[test]
fn save_then_load_reproduces_results() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("engine.bin");
    for kind in ALL_MODELS {
        let mut e = engine(kind, 0);
        e.add_document("a", &["x", "y"]);
        e.add_document("b", &["y", "z"]);
        e.add_document("c", &["x", "z", "w"]);
        e.delete_document("b");
        e.save(&path).unwrap();

        let mut loaded = engine(kind, 0);
        loaded.load(&path).unwrap();
        assert_eq!(loaded.size(), e.size());
        assert_eq!(loaded.search_by_document(&["a"], 10), e.search_by_document(&["a"], 10));
        assert_eq!(loaded.search_by_feature(&["x", "w"], 10), e.search_by_feature(&["x", "w"], 10));
        assert_eq!(loaded.oldest_document_id(), e.oldest_document_id());

        // saving the loaded engine yields the same bytes
        let again = dir.path().join("again.bin");
        loaded.save(&again).unwrap();
        assert_eq!(fs::read(&path).unwrap(), fs::read(&again).unwrap());

        // new ids continue after the restored counters
        loaded.add_document("d", &["v"]);
        assert_eq!(loaded.document_id("d"), Some(DOC_START_ID + 3));
    }
}

#[test]
fn load_missing_file_fails_without_changes() {
    let dir = tempdir().unwrap();
    let mut e = engine(ModelKind::InnerProduct, 0);
    e.add_document("a", &["x"]);
    let err = e.load(dir.path().join("missing.bin")).unwrap_err();
    assert!(!err.is_corruption());
    assert!(e.contains("a"));
}

#[test]
fn truncated_and_padded_snapshots_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.bin");
    let mut e = engine(ModelKind::Cosine, 0);
    e.add_document("a", &["x", "y"]);
    e.add_document("b", &["y"]);
    e.save(&path).unwrap();
    let bytes = fs::read(&path).unwrap();

    let mut target = engine(ModelKind::Cosine, 0);
    target.add_document("keep", &["k"]);

    for cut in [0, 7, bytes.len() / 2, bytes.len() - 1] {
        fs::write(&path, &bytes[..cut]).unwrap();
        let err = target.load(&path).unwrap_err();
        assert!(err.is_corruption(), "cut at {cut}: {err}");
        assert_eq!(target.size(), 1);
        assert!(target.contains("keep"));
    }

    let mut padded = bytes.clone();
    padded.push(0);
    fs::write(&path, &padded).unwrap();
    assert!(target.load(&path).is_err());
    assert!(target.contains("keep"));
}

#[test]
fn load_into_smaller_capacity_evicts_oldest() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.bin");
    let mut e = engine(ModelKind::InnerProduct, 0);
    for name in ["a", "b", "c", "d"] {
        e.add_document(name, &[name]);
    }
    e.save(&path).unwrap();

    let mut small = engine(ModelKind::InnerProduct, 2);
    small.load(&path).unwrap();
    assert_eq!(small.size(), 2);
    assert!(!small.contains("a") && !small.contains("b"));
    assert!(small.contains("c") && small.contains("d"));
    assert_eq!(small.config().max_documents, 2);
}

#[test]
fn snapshot_posting_cap_wins_over_configuration() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.bin");
    let mut e = SearchEngine::new(EngineConfig::default().with_max_posting(1));
    e.add_document("a", &["shared"]);
    e.add_document("b", &["shared"]);
    e.save(&path).unwrap();

    let mut loaded = SearchEngine::new(EngineConfig::default().with_max_posting(50));
    loaded.load(&path).unwrap();
    assert_eq!(loaded.config().max_posting, 1);
    assert_eq!(loaded.index().max_posting(), 1);
    loaded.add_document("c", &["shared"]);
    assert_eq!(ids(&loaded.search_by_feature(&["shared"], 10)), vec!["c"]);
}
