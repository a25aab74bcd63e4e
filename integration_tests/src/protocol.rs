//! Hublink catalog and transfer encoding, as seen by a collector.

use anyhow::{anyhow, Result};

/// End-of-data marker sent after every catalog and file
pub const EOF_SENTINEL: &[u8] = b"EOF";

const FIELD_SEPARATOR: char = '|';
const ENTRY_SEPARATOR: char = ';';

/// One file advertised in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub size: u64,
}

/// Parse an assembled catalog (`name|size;name|size`).
///
/// An empty catalog has no entries.
pub fn parse_catalog(data: &[u8]) -> Result<Vec<CatalogEntry>> {
    let text = std::str::from_utf8(data).map_err(|e| anyhow!("Catalog is not UTF-8: {}", e))?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    text.split(ENTRY_SEPARATOR)
        .map(|entry| {
            let (name, size) = entry
                .rsplit_once(FIELD_SEPARATOR)
                .ok_or_else(|| anyhow!("Catalog entry without size: {:?}", entry))?;
            let size = size
                .parse::<u64>()
                .map_err(|_| anyhow!("Invalid size in catalog entry: {:?}", entry))?;
            Ok(CatalogEntry {
                name: name.to_string(),
                size,
            })
        })
        .collect()
}

/// Concatenates fragments until the end-of-data marker arrives.
#[derive(Debug, Default)]
pub struct Reassembler {
    data: Vec<u8>,
    fragments: usize,
    largest_fragment: usize,
    complete: bool,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Returns true once the end marker has been seen.
    ///
    /// Fragments after the marker are ignored.
    pub fn push(&mut self, fragment: &[u8]) -> bool {
        if self.complete {
            return true;
        }

        if fragment == EOF_SENTINEL {
            self.complete = true;
        } else {
            self.data.extend_from_slice(fragment);
            self.fragments += 1;
            self.largest_fragment = self.largest_fragment.max(fragment.len());
        }

        self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Data fragments received, excluding the end marker
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    pub fn largest_fragment(&self) -> usize {
        self.largest_fragment
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
