//! Chunking of formatted records into bounded batches

use crate::types::{FormattedRecord, Record};

/// Default maximum number of records per batch call
pub const DEFAULT_MAX_BATCH_SIZE: usize = 400;

/// A formatted payload together with the record it was produced from
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEntry {
    pub record: Record,
    pub formatted: FormattedRecord,
}

/// An ordered, bounded run of records submitted in one batch call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Chunk {
    entries: Vec<ChunkEntry>,
}

impl Chunk {
    pub fn new(entries: Vec<ChunkEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChunkEntry] {
        &self.entries
    }

    /// Payloads in submission order
    pub fn payloads(&self) -> Vec<FormattedRecord> {
        self.entries.iter().map(|e| e.formatted.clone()).collect()
    }

    /// Total payload bytes
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.formatted.len()).sum()
    }

    /// Split into original records and payloads
    pub fn into_parts(self) -> (Vec<Record>, Vec<FormattedRecord>) {
        self.entries
            .into_iter()
            .map(|e| (e.record, e.formatted))
            .unzip()
    }
}

/// Split entries into chunks of at most `max_batch_size`, preserving order
///
/// A `max_batch_size` of 0 is treated as 1.
pub fn split_into_chunks(entries: Vec<ChunkEntry>, max_batch_size: usize) -> Vec<Chunk> {
    let size = max_batch_size.max(1);
    let mut chunks = Vec::with_capacity(entries.len().div_ceil(size));
    let mut entries = entries.into_iter().peekable();

    while entries.peek().is_some() {
        chunks.push(Chunk::new(entries.by_ref().take(size).collect()));
    }

    chunks
}
