use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use nested_archive::{ArchiveError, ArchiveReader, ArchiveWriter};
use nested_types::{GroupPath, Hierarchy, Identifier};
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::error::{StoreError, StoreResult};
use crate::item::{object_file_identifier, Item};

/// Settings shared by the index and all of its groups.
#[derive(Debug)]
pub(crate) struct StoreContext {
    pub root: PathBuf,
    pub hierarchy: Hierarchy,
    pub retry: RetryPolicy,
}

/// Backing of a group on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupState {
    /// A directory of individual object files.
    Loose,
    /// A single compressed archive holding the full identifier range.
    Archived,
}

/// One shard of the store: the identifiers `bucket_min..=bucket_max`.
///
/// A loose group tracks which identifiers have been registered. An archived
/// group trusts its archive to hold every identifier in range. The only
/// transition is `Loose -> Archived`, performed by [`Group::compact`].
pub struct Group {
    path: GroupPath,
    ctx: Arc<StoreContext>,
    bucket_min: Identifier,
    bucket_max: Identifier,
    /// Read from disk on first use, then only changed by compaction.
    state: RwLock<Option<GroupState>>,
    items: RwLock<BTreeSet<Identifier>>,
    /// Compaction lock. Also caches the archive reader once opened.
    archive: Mutex<Option<Arc<ArchiveReader>>>,
}

impl Group {
    pub(crate) fn new(path: GroupPath, ctx: Arc<StoreContext>, state: Option<GroupState>) -> Self {
        let bucket_min = path.bucket_min(&ctx.hierarchy);
        let bucket_max = path.bucket_max(&ctx.hierarchy);
        Self {
            path,
            ctx,
            bucket_min,
            bucket_max,
            state: RwLock::new(state),
            items: RwLock::new(BTreeSet::new()),
            archive: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &GroupPath {
        &self.path
    }

    /// Smallest identifier in range.
    pub fn bucket_min(&self) -> &Identifier {
        &self.bucket_min
    }

    /// Largest identifier in range (inclusive).
    pub fn bucket_max(&self) -> &Identifier {
        &self.bucket_max
    }

    pub fn capacity(&self) -> u64 {
        self.ctx.hierarchy.capacity()
    }

    /// Directory holding the group's loose objects.
    pub fn dir(&self) -> PathBuf {
        self.path.dir_in(&self.ctx.root)
    }

    /// Archive file the group compacts into.
    pub fn archive_path(&self) -> PathBuf {
        self.path.archive_in(&self.ctx.root)
    }

    pub(crate) fn object_path(&self, id: &Identifier) -> PathBuf {
        self.dir().join(id.file_name())
    }

    /// Staging file for a write in progress. Hidden, so rebuild and
    /// compaction never pick it up.
    pub(crate) fn partial_path(&self, id: &Identifier) -> PathBuf {
        self.dir().join(format!(".{}.partial", id.file_name()))
    }

    pub(crate) fn retry(&self) -> RetryPolicy {
        self.ctx.retry
    }

    pub fn state(&self) -> GroupState {
        if let Some(state) = *self.state.read().expect("group state lock poisoned") {
            return state;
        }
        let mut slot = self.state.write().expect("group state lock poisoned");
        *slot.get_or_insert_with(|| {
            if self.archive_path().is_file() {
                GroupState::Archived
            } else {
                GroupState::Loose
            }
        })
    }

    pub fn is_archived(&self) -> bool {
        self.state() == GroupState::Archived
    }

    /// Archived groups hold every identifier in range; loose groups hold
    /// what has been registered.
    pub fn exists(&self, id: &Identifier) -> bool {
        if self.is_archived() {
            self.path.contains(id, &self.ctx.hierarchy)
        } else {
            self.items.read().expect("group items lock poisoned").contains(id)
        }
    }

    /// Item handle for `id`. Archived groups synthesize it for any identifier
    /// in range; loose groups require it to be registered.
    pub fn get_or_register_item(self: &Arc<Self>, id: &Identifier) -> StoreResult<Item> {
        if self.exists(id) {
            Ok(Item::new(id.clone(), Arc::clone(self)))
        } else {
            Err(StoreError::NotFound {
                identifier: id.clone(),
                group: self.path.clone(),
            })
        }
    }

    /// Register `id` as present. Writes no bytes.
    pub fn add_item(self: &Arc<Self>, id: Identifier) -> Item {
        self.register(id.clone());
        Item::new(id, Arc::clone(self))
    }

    pub(crate) fn register(&self, id: Identifier) {
        self.items.write().expect("group items lock poisoned").insert(id);
    }

    /// Number of registered loose items.
    pub fn item_count(&self) -> usize {
        self.items.read().expect("group items lock poisoned").len()
    }

    /// Registered loose items in ascending order.
    pub fn items(&self) -> Vec<Identifier> {
        self.items
            .read()
            .expect("group items lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// A loose group is full when every identifier in range is registered
    /// and backed by a non-empty file. Archived groups are never full.
    pub fn is_full(&self) -> bool {
        if self.is_archived() {
            return false;
        }
        let items = self.items.read().expect("group items lock poisoned");
        if items.len() as u64 != self.capacity() {
            return false;
        }
        items.iter().all(|id| {
            fs::metadata(self.object_path(id))
                .map(|m| m.len() > 0)
                .unwrap_or(false)
        })
    }

    /// Identifiers in range that a loose group has not registered.
    pub fn missing(&self) -> Vec<Identifier> {
        if self.is_archived() {
            return Vec::new();
        }
        let items = self.items.read().expect("group items lock poisoned");
        RangeInclusive::new(self.bucket_min.clone(), self.bucket_max.clone())
            .filter(|id| !items.contains(id))
            .collect()
    }

    /// Smallest identifier held.
    pub fn min(&self) -> Option<Identifier> {
        if self.is_archived() {
            return Some(self.bucket_min.clone());
        }
        self.items
            .read()
            .expect("group items lock poisoned")
            .first()
            .cloned()
    }

    /// Largest identifier held.
    pub fn max(&self) -> Option<Identifier> {
        if self.is_archived() {
            return Some(self.bucket_max.clone());
        }
        self.items
            .read()
            .expect("group items lock poisoned")
            .last()
            .cloned()
    }

    /// Compact a full loose group into its archive.
    ///
    /// Returns `Ok(false)` when the group is not full or was already
    /// archived, possibly by a concurrent caller.
    pub fn compact(&self) -> StoreResult<bool> {
        match self.try_compact() {
            Err(StoreError::GroupNotFull { .. }) => Ok(false),
            other => other,
        }
    }

    /// Like [`compact`](Self::compact), but reports a group that is not yet
    /// full as [`StoreError::GroupNotFull`].
    pub fn try_compact(&self) -> StoreResult<bool> {
        let mut cached = self.archive.lock().expect("group lock poisoned");
        if self.is_archived() {
            return Ok(false);
        }
        if !self.is_full() {
            return Err(StoreError::GroupNotFull {
                group: self.path.clone(),
                count: self.item_count(),
                capacity: self.capacity(),
            });
        }

        let reader = self.write_archive()?;
        let members = reader.member_count();
        *self.state.write().expect("group state lock poisoned") = Some(GroupState::Archived);
        self.items.write().expect("group items lock poisoned").clear();
        *cached = Some(Arc::new(reader));

        info!(group = %self.path, members, "group compacted");
        Ok(true)
    }

    // Caller holds the compaction lock. Only registered items are archived,
    // and sources are deleted only after the archive has been reopened and
    // its member count checked.
    fn write_archive(&self) -> StoreResult<ArchiveReader> {
        let dir = self.dir();
        let archive_path = self.archive_path();
        let items = self.items();

        // A full group has a file for every registered item, so equal counts
        // mean the directory holds no object files beyond them.
        let mut on_disk = 0usize;
        for entry in fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))? {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let is_file = entry
                .file_type()
                .map_err(|e| StoreError::io(&entry.path(), e))?
                .is_file();
            if is_file && object_file_identifier(&entry.file_name().to_string_lossy()).is_some() {
                on_disk += 1;
            }
        }
        if on_disk != items.len() {
            warn!(group = %self.path, registered = items.len(), on_disk, "unregistered object files in group directory");
            return Err(StoreError::CompactionIntegrity {
                archive: archive_path,
                expected: items.len(),
                actual: on_disk,
            });
        }

        let mut sources: Vec<String> = items.iter().map(Identifier::file_name).collect();
        sources.sort();

        let archive_err = |e: ArchiveError| StoreError::archive(&archive_path, e);
        let mut writer = ArchiveWriter::create(&archive_path).map_err(archive_err)?;
        for name in &sources {
            let member = format!("{}/{name}", self.path.relative());
            writer
                .append_file(&member, &dir.join(name))
                .map_err(archive_err)?;
        }
        let written = writer.finish().map_err(archive_err)?;

        let reader = ArchiveReader::open(&archive_path).map_err(archive_err)?;
        if written.member_count != sources.len() || reader.member_count() != sources.len() {
            return Err(StoreError::CompactionIntegrity {
                archive: archive_path,
                expected: sources.len(),
                actual: reader.member_count(),
            });
        }

        for name in &sources {
            let path = dir.join(name);
            fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
        }
        if let Err(e) = fs::remove_dir(&dir) {
            warn!(group = %self.path, error = %e, "group directory not removed after compaction");
        }
        debug!(group = %self.path, bytes = written.bytes, "archive written");
        Ok(reader)
    }

    /// Check that an archived group can serve every identifier in range.
    /// Loose groups are always valid.
    pub fn validate(&self) -> StoreResult<()> {
        if !self.is_archived() {
            return Ok(());
        }
        let archive = self.archive_path();
        if !archive.is_file() {
            return Err(StoreError::ValidationFailure {
                archive,
                identifier: None,
                reason: "archive file is missing".into(),
            });
        }
        let reader = self.reader().map_err(|e| StoreError::ValidationFailure {
            archive: archive.clone(),
            identifier: None,
            reason: e.to_string(),
        })?;

        for id in RangeInclusive::new(self.bucket_min.clone(), self.bucket_max.clone()) {
            if let Err(e) = reader.read_member(&self.path.member_name(&id)) {
                return Err(StoreError::ValidationFailure {
                    archive,
                    identifier: Some(id),
                    reason: e.to_string(),
                });
            }
        }
        debug!(group = %self.path, "archive validated");
        Ok(())
    }

    /// Read one identifier's bytes out of the group archive.
    pub(crate) fn read_archived(&self, id: &Identifier) -> StoreResult<Vec<u8>> {
        let reader = self.reader()?;
        reader
            .read_member(&self.path.member_name(id))
            .map_err(|e| match e {
                ArchiveError::MemberNotFound(_) => StoreError::NotFound {
                    identifier: id.clone(),
                    group: self.path.clone(),
                },
                other => StoreError::archive(reader.path(), other),
            })
    }

    /// The cached archive reader, opened and indexed on first use.
    pub(crate) fn reader(&self) -> StoreResult<Arc<ArchiveReader>> {
        let mut cached = self.archive.lock().expect("group lock poisoned");
        if let Some(reader) = cached.as_ref() {
            return Ok(Arc::clone(reader));
        }
        let path = self.archive_path();
        let reader = Arc::new(ArchiveReader::open(&path).map_err(|e| StoreError::archive(&path, e))?);
        *cached = Some(Arc::clone(&reader));
        Ok(reader)
    }

    /// Drop the cached archive reader. Returns true if one was open.
    pub fn close(&self) -> bool {
        self.archive.lock().expect("group lock poisoned").take().is_some()
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("path", &self.path)
            .field("bucket_min", &self.bucket_min)
            .field("bucket_max", &self.bucket_max)
            .field("state", &*self.state.read().expect("group state lock poisoned"))
            .field("item_count", &self.item_count())
            .finish()
    }
}

/// Ascending walk over an inclusive identifier range.
pub(crate) struct RangeInclusive {
    next: Option<Identifier>,
    end: Identifier,
}

impl RangeInclusive {
    pub(crate) fn new(start: Identifier, end: Identifier) -> Self {
        let next = (start <= end).then_some(start);
        Self { next, end }
    }
}

impl Iterator for RangeInclusive {
    type Item = Identifier;

    fn next(&mut self) -> Option<Identifier> {
        let current = self.next.take()?;
        if current < self.end {
            self.next = Some(current.successor());
        }
        Some(current)
    }
}
