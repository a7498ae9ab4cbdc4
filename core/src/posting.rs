use crate::codec;
use crate::error::Result;
use crate::persist;
use crate::DocId;
use std::io::{Read, Write};

/// Ascending list of document ids for one feature, kept delta/variable-byte
/// compressed. Every mutation decodes, edits and re-encodes the whole list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    bytes: Vec<u8>,
}

impl PostingList {
    pub fn new() -> Self { Self::default() }

    pub fn as_bytes(&self) -> &[u8] { &self.bytes }

    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    pub fn len(&self) -> usize { self.list().len() }

    pub fn clear(&mut self) { self.bytes = Vec::new(); }

    /// All ids, ascending.
    pub fn list(&self) -> Vec<DocId> {
        // the buffer is only ever produced by `codec::encode` or validated by `persist::read_id_set`
        codec::decode(&self.bytes).unwrap_or_default()
    }

    pub fn contains(&self, id: DocId) -> bool {
        self.list().binary_search(&id).is_ok()
    }

    pub fn add(&mut self, id: DocId) {
        let mut ids = self.list();
        let pos = ids.partition_point(|&x| x < id);
        if ids.get(pos) == Some(&id) { return; }
        ids.insert(pos, id);
        self.bytes = codec::encode(&ids);
    }

    /// Insert `id`, then drop the smallest ids until at most `max` remain.
    /// A `max` of 0 means unbounded.
    pub fn add_bounded(&mut self, id: DocId, max: usize) {
        let mut ids = self.list();
        let pos = ids.partition_point(|&x| x < id);
        if ids.get(pos) != Some(&id) {
            ids.insert(pos, id);
        }
        let skip = if max > 0 { ids.len().saturating_sub(max) } else { 0 };
        self.bytes = codec::encode(&ids[skip..]);
    }

    /// Remove `id`; absent ids are ignored.
    pub fn remove(&mut self, id: DocId) {
        if self.bytes.is_empty() { return; }
        let mut ids = self.list();
        if let Ok(pos) = ids.binary_search(&id) {
            ids.remove(pos);
            self.bytes = codec::encode(&ids);
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        persist::write_bytes(w, &self.bytes)
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let (bytes, _) = persist::read_id_set(r, "posting list")?;
        Ok(Self { bytes })
    }
}
