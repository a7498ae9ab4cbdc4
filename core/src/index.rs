use crate::error::{Error, Result};
use crate::persist;
use crate::posting::PostingList;
use crate::{DocId, FeatureId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::{Read, Write};

/// Default number of candidates returned by [`InvertedIndex::lookup`].
pub const MAX_LOOKUP: usize = 1000;

/// Feature id -> posting list. Every list is capped at `max_posting` ids
/// (0 = unbounded); capping drops the oldest (smallest) document ids.
#[derive(Debug, Default, Clone)]
pub struct InvertedIndex {
    postings: HashMap<FeatureId, PostingList>,
    max_posting: usize,
}

impl InvertedIndex {
    pub fn new(max_posting: usize) -> Self {
        Self { postings: HashMap::new(), max_posting }
    }

    /// Number of features with at least one posting.
    pub fn len(&self) -> usize { self.postings.len() }

    pub fn is_empty(&self) -> bool { self.postings.is_empty() }

    pub fn max_posting(&self) -> usize { self.max_posting }

    pub fn clear(&mut self) { self.postings.clear(); }

    pub fn postings(&self, feature: FeatureId) -> Option<&PostingList> {
        self.postings.get(&feature)
    }

    /// Every non-empty posting list, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureId, &PostingList)> + '_ {
        self.postings.iter().map(|(f, p)| (*f, p))
    }

    pub fn add_document(&mut self, id: DocId, features: &[FeatureId]) {
        for &f in features {
            self.postings.entry(f).or_default().add_bounded(id, self.max_posting);
        }
    }

    /// Remove `id` from each feature's list, dropping lists that become empty.
    pub fn delete_document(&mut self, id: DocId, features: &[FeatureId]) {
        for f in features {
            if let Some(plist) = self.postings.get_mut(f) {
                plist.remove(id);
                if plist.is_empty() {
                    self.postings.remove(f);
                }
            }
        }
    }

    /// Union of the postings of `features`. When more than `max` documents
    /// match, keep the `max` that matched the most features (ties go to the
    /// newer document). Order of the returned ids carries no meaning.
    pub fn lookup(&self, features: &[FeatureId], max: usize) -> Vec<DocId> {
        let mut counts: HashMap<DocId, usize> = HashMap::new();
        for f in features {
            if let Some(plist) = self.postings.get(f) {
                for doc in plist.list() {
                    *counts.entry(doc).or_insert(0) += 1;
                }
            }
        }
        if counts.len() <= max {
            return counts.into_keys().collect();
        }
        let mut ranked: Vec<(DocId, usize)> = counts.into_iter().collect();
        ranked.sort_unstable_by(|a, b| match b.1.cmp(&a.1) {
            Ordering::Equal => b.0.cmp(&a.0),
            ord => ord,
        });
        ranked.truncate(max);
        ranked.into_iter().map(|(doc, _)| doc).collect()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        persist::write_u64(w, self.max_posting as u64)?;
        persist::write_u64(w, self.postings.len() as u64)?;
        let mut features: Vec<&FeatureId> = self.postings.keys().collect();
        features.sort_unstable();
        for f in features {
            persist::write_u64(w, *f)?;
            self.postings[f].write_to(w)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let max_posting = persist::read_u64(r)? as usize;
        let count = persist::read_u64(r)?;
        let mut index = Self::new(max_posting);
        for _ in 0..count {
            let feature = persist::read_u64(r)?;
            let plist = PostingList::read_from(r)?;
            if plist.is_empty() {
                continue;
            }
            if index.postings.insert(feature, plist).is_some() {
                return Err(Error::corrupt(format!("feature {feature} has two posting lists")));
            }
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sorted(mut v: Vec<DocId>) -> Vec<DocId> {
        v.sort_unstable();
        v
    }

    #[test]
    fn add_and_lookup() {
        let mut inv = InvertedIndex::new(0);
        inv.add_document(2, &[10, 11]);
        inv.add_document(3, &[11, 12]);
        inv.add_document(4, &[12]);
        assert_eq!(inv.len(), 3);
        assert_eq!(sorted(inv.lookup(&[11], MAX_LOOKUP)), vec![2, 3]);
        assert_eq!(sorted(inv.lookup(&[10, 12], MAX_LOOKUP)), vec![2, 3, 4]);
        assert!(inv.lookup(&[99], MAX_LOOKUP).is_empty());
    }

    #[test]
    fn lookup_cutoff_prefers_match_count_then_newer() {
        let mut inv = InvertedIndex::new(0);
        inv.add_document(2, &[1, 2, 3]);
        inv.add_document(3, &[1]);
        inv.add_document(4, &[1, 2]);
        inv.add_document(5, &[2]);
        let top = inv.lookup(&[1, 2, 3], 2);
        assert_eq!(top, vec![2, 4]);
        // 3 and 5 both match once; the newer one wins the last slot
        assert_eq!(inv.lookup(&[1, 2, 3], 3), vec![2, 4, 5]);
    }

    #[test]
    fn deleting_last_posting_drops_feature() {
        let mut inv = InvertedIndex::new(0);
        inv.add_document(2, &[10, 11]);
        inv.add_document(3, &[11]);
        inv.delete_document(2, &[10, 11]);
        assert_eq!(inv.len(), 1);
        assert!(inv.postings(10).is_none());
        assert_eq!(inv.postings(11).map(|p| p.list()), Some(vec![3]));
        // unknown features and documents are ignored
        inv.delete_document(42, &[11, 77]);
        assert_eq!(inv.len(), 1);
    }

    #[test]
    fn iter_and_clear() {
        let mut inv = InvertedIndex::new(0);
        inv.add_document(2, &[10, 11]);
        inv.add_document(3, &[11]);
        let mut lists: Vec<(FeatureId, Vec<DocId>)> = inv.iter().map(|(f, p)| (f, p.list())).collect();
        lists.sort_unstable();
        assert_eq!(lists, vec![(10, vec![2]), (11, vec![2, 3])]);
        inv.clear();
        assert!(inv.is_empty());
        assert_eq!(inv.iter().count(), 0);
    }

    #[test]
    fn posting_cap_drops_oldest_documents() {
        let mut inv = InvertedIndex::new(2);
        for doc in 2..6 {
            inv.add_document(doc, &[7]);
        }
        assert_eq!(inv.postings(7).map(|p| p.list()), Some(vec![4, 5]));
        assert_eq!(sorted(inv.lookup(&[7], MAX_LOOKUP)), vec![4, 5]);
    }

    #[test]
    fn save_and_load() {
        let mut inv = InvertedIndex::new(50);
        inv.add_document(2, &[3, 4, 5]);
        inv.add_document(9, &[4]);
        let mut buf = Vec::new();
        inv.write_to(&mut buf).unwrap();
        let loaded = InvertedIndex::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(loaded.max_posting(), 50);
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.postings(4).map(|p| p.list()), Some(vec![2, 9]));
    }

    #[test]
    fn truncated_snapshot_fails() {
        let mut inv = InvertedIndex::new(0);
        inv.add_document(2, &[3, 4]);
        let mut buf = Vec::new();
        inv.write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(InvertedIndex::read_from(&mut Cursor::new(buf)).is_err());
    }
}
