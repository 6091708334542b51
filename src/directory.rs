//! A parsed Image File Directory: an ordered collection of tagged entries.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use crate::decoder::ifd::{Entry, Value};
use crate::decoder::stream::EndianReader;
use crate::decoder::Limits;
use crate::tags::{IfdPointer, Tag};
use crate::TiffResult;

/// One Image File Directory.
///
/// Entries are keyed by their raw tag number rather than the `Tag` enum so
/// that private/unknown tags survive the round trip; `Tag::Unknown` is only
/// a presentation-layer concept.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: BTreeMap<u16, Entry>,
    pub(crate) next_ifd: Option<IfdPointer>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_ifd: None,
        }
    }

    pub fn insert(&mut self, tag: Tag, entry: Entry) -> Option<Entry> {
        self.entries.insert(tag.to_u16(), entry)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.entries.contains_key(&tag.to_u16())
    }

    pub fn get(&self, tag: Tag) -> Option<&Entry> {
        self.entries.get(&tag.to_u16())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &Entry)> {
        self.entries
            .iter()
            .map(|(&raw, entry)| (Tag::from_u16_exhaustive(raw), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next(&self) -> Option<IfdPointer> {
        self.next_ifd
    }

    /// Looks up and decodes a tag's value, if present.
    pub fn find_tag<R: Read + Seek>(
        &self,
        tag: Tag,
        limits: &Limits,
        reader: &mut EndianReader<R>,
    ) -> TiffResult<Option<Value>> {
        self.get(tag)
            .map(|entry| entry.val(limits, reader))
            .transpose()
    }

    /// Like [`Directory::find_tag`] but fails with `RequiredTagNotFound` when absent.
    pub fn require_tag<R: Read + Seek>(
        &self,
        tag: Tag,
        limits: &Limits,
        reader: &mut EndianReader<R>,
    ) -> TiffResult<Value> {
        self.find_tag(tag, limits, reader)?.ok_or_else(|| {
            crate::TiffError::FormatError(crate::TiffFormatError::RequiredTagNotFound(tag))
        })
    }
}
