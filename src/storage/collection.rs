use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::primitives::io::LineFile;
use crate::storage::ids::IdGenerator;
use crate::storage::record::{Record, Schema};
use crate::types::{Collection, RecordId, Result, StoreError};

/// What a rewrite transform decides for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Leave the record as it is.
    Keep,
    /// Swap in a new record at the same position.
    Replace(Record),
    /// Remove the record.
    Drop,
}

/// Records read from disk plus the malformed lines that were skipped.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    /// Well-formed records in insertion order.
    pub records: Vec<Record>,
    /// Lines whose field count did not fit the schema.
    pub skipped: usize,
}

/// Durable, ordered sequence of records for one collection.
///
/// None of these methods lock anything. Callers must hold the collection's
/// write lock for [`append`](Self::append) and [`rewrite_all`](Self::rewrite_all)
/// and at least its read lock for [`scan`](Self::scan); the session handed
/// out by the store enforces this.
pub struct CollectionStore {
    collection: Collection,
    schema: Schema,
    file: LineFile,
    ids: Arc<IdGenerator>,
}

impl CollectionStore {
    /// Opens the backing file for `collection` inside `dir`.
    pub fn open(
        dir: &Path,
        collection: Collection,
        ids: Arc<IdGenerator>,
        create: bool,
        sync: bool,
    ) -> Result<Self> {
        let file = LineFile::open(dir.join(collection.file_name()), create, sync)?;
        Ok(Self {
            collection,
            schema: Schema::of(collection),
            file,
            ids,
        })
    }

    /// Which collection this store holds.
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Backing file.
    pub fn file(&self) -> &LineFile {
        &self.file
    }

    /// Reads every well-formed record, skipping blank and malformed lines.
    pub fn load(&self) -> Result<Loaded> {
        let contents = self.file.read_all()?;
        let mut loaded = Loaded::default();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let record = Record::decode(line);
            if self.schema.accepts(record.len()) {
                loaded.records.push(record);
            } else {
                loaded.skipped += 1;
                warn!(
                    collection = %self.collection,
                    fields = record.len(),
                    "storage.load.skipped_malformed"
                );
            }
        }
        Ok(loaded)
    }

    /// Appends `record`, prefixing a fresh id when the schema generates one.
    ///
    /// `record` carries every field except the generated id.
    pub fn append(&self, record: Record) -> Result<RecordId> {
        let total = record.len() + usize::from(self.schema.generated_id);
        if !self.schema.accepts(total) {
            return Err(StoreError::invalid(format!(
                "{} record needs {} fields, got {total}",
                self.collection, self.schema.required
            )));
        }
        record.validate()?;
        let record = if self.schema.generated_id {
            let existing = self.load()?;
            let taken: HashSet<&str> = existing
                .records
                .iter()
                .filter_map(|r| r.field(0))
                .collect();
            let id = self.ids.fresh(&taken)?;
            record.with_id(&id)
        } else {
            record
        };
        let id = RecordId(record.field(0).unwrap_or_default().to_string());
        self.file.append_line(&record.encode())?;
        debug!(collection = %self.collection, id = %id, "storage.append");
        Ok(id)
    }

    /// Records matching `predicate`, in insertion order.
    pub fn scan<F>(&self, predicate: F) -> Result<Vec<Record>>
    where
        F: FnMut(&Record) -> bool,
    {
        let mut predicate = predicate;
        Ok(self
            .load()?
            .records
            .into_iter()
            .filter(|r| predicate(r))
            .collect())
    }

    /// Applies `transform` to every record and replaces the persisted image.
    ///
    /// Malformed lines are not shown to the transform and are written back
    /// untouched. Nothing is written when no record changed. Returns whether
    /// any record was replaced or dropped.
    pub fn rewrite_all<F>(&self, transform: F) -> Result<bool>
    where
        F: FnMut(&Record) -> Rewrite,
    {
        let mut transform = transform;
        let contents = self.file.read_all()?;
        let mut lines: Vec<String> = Vec::new();
        let mut replaced = 0usize;
        let mut dropped = 0usize;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let record = Record::decode(line);
            if !self.schema.accepts(record.len()) {
                warn!(
                    collection = %self.collection,
                    fields = record.len(),
                    "storage.rewrite.skipped_malformed"
                );
                lines.push(line.to_string());
                continue;
            }
            match transform(&record) {
                Rewrite::Keep => lines.push(line.to_string()),
                Rewrite::Replace(next) => {
                    if !self.schema.accepts(next.len()) {
                        return Err(StoreError::invalid(format!(
                            "replacement {} record has {} fields",
                            self.collection,
                            next.len()
                        )));
                    }
                    next.validate()?;
                    if next != record {
                        replaced += 1;
                    }
                    lines.push(next.encode());
                }
                Rewrite::Drop => dropped += 1,
            }
        }
        let changed = replaced > 0 || dropped > 0;
        if changed {
            self.file.replace_lines(lines.iter().map(String::as_str))?;
        }
        debug!(
            collection = %self.collection,
            replaced,
            dropped,
            "storage.rewrite_all"
        );
        Ok(changed)
    }
}
