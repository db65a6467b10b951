//! Binary partition codec.
//!
//! One partition file exists per [`ModuleType`](super::ModuleType). The
//! layout is little-endian throughout:
//!
//! ```text
//! i64 version | u32 count | count x { u32 nameLen | name bytes (UTF-8)
//!                                     | i64 offset | u32 size }
//! ```
//!
//! followed by a data region addressed by those offsets. Offsets are
//! absolute from the start of the partition buffer; [`Partition::to_bytes`]
//! lays the data region out immediately after the index and records the
//! resulting absolute offsets. In memory the partition keeps a
//! name-to-bytes map; the index and count are re-derived when serializing.

use std::collections::BTreeMap;

use crate::error::{KitbagError, Result};

/// Fixed bytes before the index: version (8) + entry count (4).
const HEADER_LEN: usize = 12;

/// Index record for one named blob inside a partition buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobIndexEntry {
    pub name: String,
    /// Absolute byte offset of the blob from the start of the buffer.
    pub offset: i64,
    pub size: u32,
}

impl BlobIndexEntry {
    /// Encoded length of this entry within the index.
    fn encoded_len(&self) -> usize {
        4 + self.name.len() + 8 + 4
    }
}

/// One module type's binary resource: version plus named blob payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    version: i64,
    blobs: BTreeMap<String, Vec<u8>>,
}

impl Partition {
    /// Empty partition at the given content version.
    pub fn new(version: i64) -> Self {
        Self {
            version,
            blobs: BTreeMap::new(),
        }
    }

    /// Monotonically non-decreasing content version.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Adds or replaces one named blob payload.
    pub fn insert_blob(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.insert(name.into(), bytes);
    }

    pub fn blob(&self, name: &str) -> Option<&[u8]> {
        self.blobs.get(name).map(Vec::as_slice)
    }

    /// Blobs whose name starts with `prefix`, in name order.
    pub fn blobs_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a [u8])> + 'a {
        self.blobs
            .iter()
            .filter(move |(name, _)| name.starts_with(prefix))
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    /// Canonical index for the current contents: entries in name order with
    /// absolute offsets placing the data region right after the index.
    pub fn index(&self) -> Vec<BlobIndexEntry> {
        let index_len: usize = self
            .blobs
            .keys()
            .map(|name| 4 + name.len() + 8 + 4)
            .sum();
        let mut offset = HEADER_LEN + index_len;
        self.blobs
            .iter()
            .map(|(name, bytes)| {
                let entry = BlobIndexEntry {
                    name: name.clone(),
                    offset: offset as i64,
                    size: bytes.len() as u32,
                };
                offset += bytes.len();
                entry
            })
            .collect()
    }

    /// Serializes header, index, and data region into one buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let index = self.index();
        let data_len: usize = self.blobs.values().map(Vec::len).sum();
        let index_len: usize = index.iter().map(BlobIndexEntry::encoded_len).sum();
        let mut out = Vec::with_capacity(HEADER_LEN + index_len + data_len);

        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(index.len() as u32).to_le_bytes());
        for entry in &index {
            out.extend_from_slice(&(entry.name.len() as u32).to_le_bytes());
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&entry.offset.to_le_bytes());
            out.extend_from_slice(&entry.size.to_le_bytes());
        }
        // blobs iterate in the same name order the index was built from, so
        // appending them lands each at its recorded absolute offset
        for bytes in self.blobs.values() {
            out.extend_from_slice(bytes);
        }
        out
    }

    /// Parses a partition buffer: header, index, then the data region
    /// addressed by each entry's absolute offset/size.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let mut cursor = 0usize;
        let version = read_i64(raw, &mut cursor)?;
        let count = read_u32(raw, &mut cursor)?;

        let mut entries = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            let name_len = read_u32(raw, &mut cursor)? as usize;
            let name_bytes = take(raw, &mut cursor, name_len)?;
            let name = std::str::from_utf8(name_bytes)
                .map_err(|err| {
                    KitbagError::CatalogParse(format!("partition blob name is not UTF-8: {err}"))
                })?
                .to_string();
            let offset = read_i64(raw, &mut cursor)?;
            let size = read_u32(raw, &mut cursor)?;
            entries.push(BlobIndexEntry { name, offset, size });
        }

        validate_entries(&entries, raw.len())?;

        let mut blobs = BTreeMap::new();
        for entry in entries {
            let start = entry.offset as usize;
            let end = start + entry.size as usize;
            if blobs.insert(entry.name.clone(), raw[start..end].to_vec()).is_some() {
                return Err(KitbagError::CatalogParse(format!(
                    "duplicate blob name in partition index: {}",
                    entry.name
                )));
            }
        }

        Ok(Self { version, blobs })
    }
}

/// Bounds and overlap checks over a parsed index.
fn validate_entries(entries: &[BlobIndexEntry], buffer_len: usize) -> Result<()> {
    let mut spans: Vec<(usize, usize, &str)> = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.offset < 0 {
            return Err(KitbagError::CatalogParse(format!(
                "blob {} has negative offset {}",
                entry.name, entry.offset
            )));
        }
        let start = entry.offset as usize;
        let end = match start.checked_add(entry.size as usize) {
            Some(end) if end <= buffer_len => end,
            _ => {
                return Err(KitbagError::CatalogParse(format!(
                    "blob {} ({} bytes at offset {}) runs past the end of the buffer",
                    entry.name, entry.size, entry.offset
                )))
            }
        };
        spans.push((start, end, &entry.name));
    }
    spans.sort_unstable();
    for pair in spans.windows(2) {
        let (_, first_end, first_name) = pair[0];
        let (second_start, second_end, second_name) = pair[1];
        // zero-length blobs occupy no bytes and cannot overlap
        if second_start < first_end && second_start != second_end {
            return Err(KitbagError::CatalogParse(format!(
                "blobs {first_name} and {second_name} overlap in the data region"
            )));
        }
    }
    Ok(())
}

fn take<'a>(raw: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = cursor
        .checked_add(len)
        .filter(|end| *end <= raw.len())
        .ok_or_else(|| {
            KitbagError::CatalogParse(format!(
                "partition truncated: wanted {len} bytes at offset {cursor}, buffer is {} bytes",
                raw.len()
            ))
        })?;
    let slice = &raw[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn read_u32(raw: &[u8], cursor: &mut usize) -> Result<u32> {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(take(raw, cursor, 4)?);
    Ok(u32::from_le_bytes(buf))
}

fn read_i64(raw: &[u8], cursor: &mut usize) -> Result<i64> {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(take(raw, cursor, 8)?);
    Ok(i64::from_le_bytes(buf))
}
