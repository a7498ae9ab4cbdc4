//! Content-similarity search over documents described by sets of opaque
//! feature strings.
//!
//! [`SearchEngine`] is the entry point: it maps string ids onto integer
//! ids, keeps candidate retrieval in an [`InvertedIndex`] and ranking in a
//! [`ScoringModel`], and persists everything to a single binary snapshot.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod model;
pub mod persist;
pub mod posting;

pub type DocId = u64;
pub type FeatureId = u64;
pub type Score = f64;

pub use config::{EngineConfig, ModelKind};
pub use engine::SearchEngine;
pub use error::{CodecError, Error, Result};
pub use index::InvertedIndex;
pub use model::{Ranker, ScoringModel};
pub use posting::PostingList;
