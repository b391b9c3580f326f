use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use nested_types::{GroupPath, Hierarchy, Identifier, ARCHIVE_EXTENSION};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::RetryPolicy;
use crate::error::{StoreError, StoreResult};
use crate::group::{Group, GroupState, RangeInclusive, StoreContext};
use crate::item::{object_file_identifier, publish, Item, ItemWriter};
use crate::report::{CompactionReport, ValidationMode, ValidationReport};

/// How [`Index::put_file`] transfers the source file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransferMode {
    #[default]
    Copy,
    /// Rename the source into place, falling back to copy and remove when
    /// the rename fails (e.g. across filesystems).
    Move,
}

/// Options for storing a file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Replace an identifier that is already stored.
    pub overwrite: bool,
    pub mode: TransferMode,
}

impl PutOptions {
    pub fn copy() -> Self {
        Self::default()
    }

    pub fn moved() -> Self {
        Self {
            overwrite: false,
            mode: TransferMode::Move,
        }
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Catalog of every group under a store root.
///
/// The filesystem is the only source of truth: [`rebuild`](Index::rebuild)
/// recovers the catalog by scanning the root, at a cost proportional to the
/// number of files. New groups are created on first write, serialized by a
/// single creation lock.
pub struct Index {
    ctx: Arc<StoreContext>,
    groups: RwLock<BTreeMap<GroupPath, Arc<Group>>>,
    create_lock: Mutex<()>,
}

impl Index {
    /// An empty index over `root`. Call [`rebuild`](Self::rebuild) to load
    /// what is already on disk.
    pub fn new(root: impl Into<PathBuf>, hierarchy: Hierarchy, retry: RetryPolicy) -> Self {
        Self {
            ctx: Arc::new(StoreContext {
                root: root.into(),
                hierarchy,
                retry,
            }),
            groups: RwLock::new(BTreeMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    /// Create an index and rebuild it from disk.
    pub fn open(root: impl Into<PathBuf>, hierarchy: Hierarchy, retry: RetryPolicy) -> StoreResult<Self> {
        let index = Self::new(root, hierarchy, retry);
        index.rebuild()?;
        Ok(index)
    }

    pub fn root(&self) -> &Path {
        &self.ctx.root
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.ctx.hierarchy
    }

    /// Replace the catalog with what is on disk.
    ///
    /// Loose `{id}.bin` files register their group and item; `.tgz` files
    /// register an archived group without listing its members. Hidden
    /// staging files, misplaced objects, and paths that do not fit the
    /// hierarchy are skipped with a warning. When a group has both an
    /// archive and loose files, the archive wins.
    pub fn rebuild(&self) -> StoreResult<()> {
        let root = &self.ctx.root;
        let mut found: BTreeMap<GroupPath, (bool, BTreeSet<Identifier>)> = BTreeMap::new();

        for entry in WalkDir::new(root).min_depth(1) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                StoreError::Io {
                    path,
                    source: e.into(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            if let Some(id) = object_file_identifier(name) {
                let Some(group) = path.parent().and_then(|dir| self.group_path_at(dir)) else {
                    warn!(path = %path.display(), "object outside any group directory; skipped");
                    continue;
                };
                if self.resolve_group_path(&id) != group {
                    warn!(path = %path.display(), group = %group, "object stored in the wrong group; skipped");
                    continue;
                }
                found.entry(group).or_default().1.insert(id);
            } else if let Some(stem) = archive_stem(name) {
                match self.group_path_at(&path.with_file_name(stem)) {
                    Some(group) => found.entry(group).or_default().0 = true,
                    None => warn!(path = %path.display(), "archive outside the hierarchy; skipped"),
                }
            }
        }

        let mut groups = BTreeMap::new();
        let (mut archived, mut items) = (0usize, 0usize);
        for (path, (has_archive, ids)) in found {
            let group = if has_archive {
                if !ids.is_empty() {
                    warn!(group = %path, loose = ids.len(), "group has both an archive and loose objects; using the archive");
                }
                archived += 1;
                Group::new(path.clone(), Arc::clone(&self.ctx), Some(GroupState::Archived))
            } else {
                let group = Group::new(path.clone(), Arc::clone(&self.ctx), None);
                items += ids.len();
                for id in ids {
                    group.register(id);
                }
                group
            };
            groups.insert(path, Arc::new(group));
        }

        let count = groups.len();
        *self.groups.write().expect("index lock poisoned") = groups;
        info!(root = %root.display(), groups = count, archived, items, "index rebuilt");
        Ok(())
    }

    // Group path of a directory under the root, if it fits the hierarchy.
    fn group_path_at(&self, dir: &Path) -> Option<GroupPath> {
        let relative = dir.strip_prefix(&self.ctx.root).ok()?;
        let mut path = String::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    path.push('/');
                    path.push_str(part.to_str()?);
                }
                _ => return None,
            }
        }
        GroupPath::parse(&path, &self.ctx.hierarchy).ok()
    }

    /// Group path an identifier belongs to.
    pub fn resolve_group_path(&self, id: &Identifier) -> GroupPath {
        GroupPath::resolve(id, &self.ctx.hierarchy)
    }

    /// Look up a known group.
    pub fn group(&self, path: &GroupPath) -> Option<Arc<Group>> {
        self.groups
            .read()
            .expect("index lock poisoned")
            .get(path)
            .cloned()
    }

    /// Known group paths in ascending order.
    pub fn group_paths(&self) -> Vec<GroupPath> {
        self.groups
            .read()
            .expect("index lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Number of known groups.
    pub fn group_count(&self) -> usize {
        self.groups.read().expect("index lock poisoned").len()
    }

    fn snapshot(&self) -> Vec<Arc<Group>> {
        self.groups
            .read()
            .expect("index lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn exists(&self, id: &Identifier) -> bool {
        self.group(&self.resolve_group_path(id))
            .is_some_and(|group| group.exists(id))
    }

    /// Item handle for a stored identifier.
    pub fn get(&self, id: &Identifier) -> StoreResult<Item> {
        let path = self.resolve_group_path(id);
        match self.group(&path) {
            Some(group) => group.get_or_register_item(id),
            None => Err(StoreError::NotFound {
                identifier: id.clone(),
                group: path,
            }),
        }
    }

    /// Store a copy (or move) of `source` under `id`.
    pub fn put_file(&self, id: &Identifier, source: &Path, options: PutOptions) -> StoreResult<Item> {
        let group = self.prepare_put(id, options.overwrite)?;
        let staged = group.partial_path(id);

        if options.mode == TransferMode::Move {
            let target = group.object_path(id);
            match fs::rename(source, &target) {
                Ok(()) => {
                    debug!(identifier = %id, source = %source.display(), "object moved into place");
                    return Ok(group.add_item(id.clone()));
                }
                Err(e) => {
                    debug!(identifier = %id, error = %e, "rename failed; copying instead");
                }
            }
        }

        if let Err(e) = fs::copy(source, &staged) {
            let _ = fs::remove_file(&staged);
            return Err(StoreError::io(source, e));
        }
        let item = publish(&group, id, &staged)?;
        if options.mode == TransferMode::Move {
            return Ok(remove_moved_source(source, item));
        }
        Ok(item)
    }

    /// Store `data` under `id`.
    pub fn put_bytes(&self, id: &Identifier, data: &[u8], overwrite: bool) -> StoreResult<Item> {
        let mut writer = self.writer(id, overwrite)?;
        writer
            .write_all(data)
            .map_err(|e| StoreError::io(writer.staging_path(), e))?;
        writer.commit()
    }

    /// Open a write sink for `id`. The object appears once the writer is
    /// committed.
    pub fn writer(&self, id: &Identifier, overwrite: bool) -> StoreResult<ItemWriter> {
        let group = self.prepare_put(id, overwrite)?;
        ItemWriter::create(group, id.clone())
    }

    fn prepare_put(&self, id: &Identifier, overwrite: bool) -> StoreResult<Arc<Group>> {
        let path = self.resolve_group_path(id);
        let group = match self.group(&path) {
            Some(group) => group,
            None => self.create_group(path)?,
        };
        if group.is_archived() {
            return Err(StoreError::WriteToArchived {
                identifier: id.clone(),
                group: group.path().clone(),
            });
        }
        if !overwrite && group.exists(id) {
            return Err(StoreError::AlreadyExists {
                identifier: id.clone(),
                path: group.object_path(id),
            });
        }
        Ok(group)
    }

    // First write into an unseen range. An archive already on disk makes
    // the new group archived, which the caller rejects.
    fn create_group(&self, path: GroupPath) -> StoreResult<Arc<Group>> {
        let _guard = self.create_lock.lock().expect("group creation lock poisoned");
        if let Some(group) = self.group(&path) {
            return Ok(group);
        }

        let group = Arc::new(Group::new(path.clone(), Arc::clone(&self.ctx), None));
        if !group.is_archived() {
            let dir = group.dir();
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
            debug!(group = %path, "group created");
        }
        self.groups
            .write()
            .expect("index lock poisoned")
            .insert(path, Arc::clone(&group));
        Ok(group)
    }

    /// Compact every full loose group. Failures are collected, not fatal.
    pub fn compact_all(&self) -> CompactionReport {
        let mut report = CompactionReport::default();
        for group in self.snapshot() {
            match group.try_compact() {
                Ok(true) => report.compacted.push(group.path().clone()),
                Ok(false) | Err(StoreError::GroupNotFull { .. }) => report.skipped += 1,
                Err(e) => {
                    warn!(group = %group.path(), error = %e, "compaction failed");
                    report.failed.push((group.path().clone(), e));
                }
            }
        }
        info!(
            compacted = report.compacted.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            "compaction sweep finished"
        );
        report
    }

    /// Validate every group, closing each archive afterwards.
    pub fn validate_all(&self, mode: ValidationMode) -> ValidationReport {
        let mut report = ValidationReport::default();
        for group in self.snapshot() {
            let result = group.validate();
            group.close();
            let failed = result.is_err();
            if let Err(e) = &result {
                warn!(group = %group.path(), error = %e, "group failed validation");
            }
            report.results.push((group.path().clone(), result));
            if failed && mode == ValidationMode::FailFast {
                break;
            }
        }
        info!(
            checked = report.checked(),
            invalid = report.invalid().count(),
            "validation sweep finished"
        );
        report
    }

    /// Smallest stored identifier.
    pub fn min(&self) -> Option<Identifier> {
        self.snapshot().iter().find_map(|group| group.min())
    }

    /// Largest stored identifier.
    pub fn max(&self) -> Option<Identifier> {
        self.snapshot().iter().rev().find_map(|group| group.max())
    }

    /// Every identifier in `[min, max]` that is not stored, in ascending
    /// order. Computed lazily.
    pub fn missing(&self) -> Missing<'_> {
        let range = match (self.min(), self.max()) {
            (Some(min), Some(max)) => Some(RangeInclusive::new(min, max)),
            _ => None,
        };
        Missing { index: self, range }
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("root", &self.ctx.root)
            .field("hierarchy", &self.ctx.hierarchy)
            .field("group_count", &self.group_count())
            .finish()
    }
}

/// Iterator over identifiers missing from an [`Index`].
pub struct Missing<'a> {
    index: &'a Index,
    range: Option<RangeInclusive>,
}

impl Iterator for Missing<'_> {
    type Item = Identifier;

    fn next(&mut self) -> Option<Identifier> {
        let index = self.index;
        self.range.as_mut()?.find(|id| !index.exists(id))
    }
}

// The object is already published, so a source that cannot be removed is
// left behind rather than failing the put.
fn remove_moved_source(source: &Path, item: Item) -> Item {
    if let Err(e) = fs::remove_file(source) {
        warn!(
            identifier = %item.identifier(),
            source = %source.display(),
            error = %e,
            "object stored but source not removed"
        );
    }
    item
}

fn archive_stem(name: &str) -> Option<&str> {
    name.strip_suffix(ARCHIVE_EXTENSION)?.strip_suffix('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn index(root: &Path, widths: &[usize]) -> Index {
        Index::new(root, Hierarchy::decimal(widths).unwrap(), RetryPolicy::none())
    }

    fn payload(id: u64) -> Vec<u8> {
        format!("payload-{id}").into_bytes()
    }

    fn put(index: &Index, id: u64) -> Item {
        index
            .put_bytes(&Identifier::from(id), &payload(id), false)
            .unwrap()
    }

    fn catalog(index: &Index) -> Vec<(GroupPath, GroupState, Vec<Identifier>)> {
        index
            .snapshot()
            .iter()
            .map(|g| (g.path().clone(), g.state(), g.items()))
            .collect()
    }

    // ----------------------------------------------------------------
    // Write path
    // ----------------------------------------------------------------

    #[test]
    fn put_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[3, 3, 3]);
        let id = Identifier::from(12345678);
        let item = index.put_bytes(&id, b"hello", false).unwrap();

        assert_eq!(item.path_in_store(), dir.path().join("012/345/12345678.bin"));
        assert!(index.exists(&id));
        assert_eq!(index.get(&id).unwrap().read_all().unwrap(), b"hello");
    }

    #[test]
    fn put_refuses_existing_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        put(&index, 5);

        let err = index
            .put_bytes(&Identifier::from(5), b"again", false)
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        index.put_bytes(&Identifier::from(5), b"again", true).unwrap();
        assert_eq!(index.get(&Identifier::from(5)).unwrap().read_all().unwrap(), b"again");
    }

    #[test]
    fn put_file_copy_and_move() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        let index = index(&store, &[1, 1, 1]);
        let source = dir.path().join("input.bin");

        fs::write(&source, b"copied").unwrap();
        index
            .put_file(&Identifier::from(1), &source, PutOptions::copy())
            .unwrap();
        assert!(source.exists());

        fs::write(&source, b"moved").unwrap();
        index
            .put_file(&Identifier::from(2), &source, PutOptions::moved())
            .unwrap();
        assert!(!source.exists());

        assert_eq!(index.get(&Identifier::from(1)).unwrap().read_all().unwrap(), b"copied");
        assert_eq!(index.get(&Identifier::from(2)).unwrap().read_all().unwrap(), b"moved");
    }

    #[test]
    fn leftover_move_source_does_not_fail_the_put() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(&dir.path().join("store"), &[1, 1, 1]);
        let source = dir.path().join("input.bin");
        fs::write(&source, b"kept").unwrap();
        let item = index
            .put_file(&Identifier::from(4), &source, PutOptions::copy())
            .unwrap();

        let gone = dir.path().join("already-removed.bin");
        let item = remove_moved_source(&gone, item);
        assert_eq!(item.identifier(), &Identifier::from(4));
        assert!(index.exists(&Identifier::from(4)));
        assert_eq!(item.read_all().unwrap(), b"kept");
    }

    #[test]
    fn put_file_missing_source_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        let err = index
            .put_file(&Identifier::from(3), &dir.path().join("absent"), PutOptions::copy())
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(!index.exists(&Identifier::from(3)));
    }

    #[test]
    fn unknown_identifier_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        let err = index.get(&Identifier::from(77)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        put(&index, 70);
        let err = index.get(&Identifier::from(77)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!index.exists(&Identifier::from(77)));
    }

    #[test]
    fn concurrent_first_writes_share_one_group() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[2, 2]);

        thread::scope(|s| {
            for id in 0..16u64 {
                let index = &index;
                s.spawn(move || put(index, 4200 + id));
            }
        });

        assert_eq!(index.group_count(), 1);
        let group = index.group(&index.resolve_group_path(&Identifier::from(4200))).unwrap();
        assert_eq!(group.item_count(), 16);
        for id in 0..16u64 {
            let id = 4200 + id;
            assert_eq!(index.get(&Identifier::from(id)).unwrap().read_all().unwrap(), payload(id));
        }
    }

    // ----------------------------------------------------------------
    // Compaction
    // ----------------------------------------------------------------

    #[test]
    fn fullness_and_compaction_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        for id in 0..9 {
            put(&index, id);
        }
        let group = index.group(&index.resolve_group_path(&Identifier::zero())).unwrap();
        assert!(!group.is_full());

        put(&index, 9);
        assert!(group.is_full());
        assert!(group.compact().unwrap());
        assert!(!group.compact().unwrap());

        let item = put(&index, 10);
        let next = item.group();
        assert_eq!(next.path().as_str(), "/0/1");
        assert_eq!(next.state(), GroupState::Loose);
        assert_eq!(index.group_count(), 2);
    }

    #[test]
    fn archived_groups_reject_writes() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        for id in 10..20 {
            put(&index, id);
        }
        index.compact_all();

        for overwrite in [false, true] {
            let err = index
                .put_bytes(&Identifier::from(15), b"late", overwrite)
                .unwrap_err();
            assert!(matches!(err, StoreError::WriteToArchived { .. }));
        }
    }

    #[test]
    fn unseen_archive_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let writer_side = index(dir.path(), &[1, 1, 1]);
        for id in 10..20 {
            put(&writer_side, id);
        }
        writer_side.compact_all();

        // A second index that never rebuilt still sees the archive on disk.
        let other = index(dir.path(), &[1, 1, 1]);
        let err = other
            .put_bytes(&Identifier::from(11), b"x", true)
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteToArchived { .. }));
        assert!(!dir.path().join("0/1").exists());
    }

    #[test]
    fn reads_survive_compaction() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        for id in 0..25 {
            put(&index, id);
        }
        let before: Vec<Vec<u8>> = (0..25)
            .map(|id| index.get(&Identifier::from(id)).unwrap().read_all().unwrap())
            .collect();

        let report = index.compact_all();
        assert_eq!(report.compacted.len(), 2);
        assert_eq!(report.skipped, 1);
        assert!(report.is_clean());

        for id in 0..25u64 {
            let item = index.get(&Identifier::from(id)).unwrap();
            assert_eq!(item.is_archived(), id < 20);
            assert_eq!(item.read_all().unwrap(), before[id as usize]);
        }
    }

    #[test]
    fn compact_all_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        for id in 0..20 {
            put(&index, id);
        }
        // A stray archive next to a full loose group.
        let blocked = index.resolve_group_path(&Identifier::zero());
        index.group(&blocked).unwrap().state();
        fs::write(blocked.archive_in(dir.path()), b"stray").unwrap();

        let report = index.compact_all();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, blocked);
        assert_eq!(report.compacted.len(), 1);
        assert_eq!(report.compacted[0].as_str(), "/0/1");
    }

    // ----------------------------------------------------------------
    // Rebuild
    // ----------------------------------------------------------------

    #[test]
    fn rebuild_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        for id in (0..20).chain([42, 47, 305]) {
            put(&index, id);
        }
        index.compact_all();

        index.rebuild().unwrap();
        let first = catalog(&index);
        index.rebuild().unwrap();
        assert_eq!(catalog(&index), first);

        let paths: Vec<&str> = first.iter().map(|(p, _, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["/0/0", "/0/1", "/0/4", "/3/0"]);
        assert_eq!(first[0].1, GroupState::Archived);
        assert_eq!(first[2].2, vec![Identifier::from(42), Identifier::from(47)]);
    }

    #[test]
    fn rebuild_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("0/1")).unwrap();
        fs::write(root.join("0/1/11.bin"), b"ok").unwrap();
        fs::write(root.join("0/1/35.bin"), b"misplaced").unwrap();
        fs::write(root.join("0/1/.12.bin.partial"), b"staging").unwrap();
        fs::write(root.join("0/1/notes.txt"), b"ignored").unwrap();
        fs::write(root.join("stray.bin"), b"no group").unwrap();
        fs::create_dir_all(root.join("abc")).unwrap();
        fs::write(root.join("abc/7.bin"), b"bad path").unwrap();

        let index = index(root, &[1, 1, 1]);
        index.rebuild().unwrap();
        assert_eq!(index.group_paths().len(), 1);
        let group = index.group(&index.group_paths()[0]).unwrap();
        assert_eq!(group.items(), vec![Identifier::from(11)]);
    }

    #[test]
    fn compact_all_refuses_groups_with_misplaced_objects() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("0/1")).unwrap();
        for id in 10..20 {
            fs::write(dir.path().join(format!("0/1/{id}.bin")), payload(id)).unwrap();
        }
        fs::write(dir.path().join("0/1/25.bin"), b"misplaced").unwrap();

        let index = index(dir.path(), &[1, 1, 1]);
        index.rebuild().unwrap();
        let report = index.compact_all();

        assert!(report.compacted.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, StoreError::CompactionIntegrity { .. }));
        assert!(dir.path().join("0/1/25.bin").is_file());
        assert!(!dir.path().join("0/1.tgz").exists());
        assert_eq!(index.get(&Identifier::from(15)).unwrap().read_all().unwrap(), payload(15));
    }

    #[test]
    fn rebuild_prefers_archive_over_loose_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        for id in 10..20 {
            put(&index, id);
        }
        index.compact_all();
        fs::create_dir_all(dir.path().join("0/1")).unwrap();
        fs::write(dir.path().join("0/1/13.bin"), b"leftover").unwrap();

        index.rebuild().unwrap();
        let group = index.group(&index.group_paths()[0]).unwrap();
        assert!(group.is_archived());
        assert_eq!(
            index.get(&Identifier::from(13)).unwrap().read_all().unwrap(),
            payload(13)
        );
    }

    // ----------------------------------------------------------------
    // Ranges and validation
    // ----------------------------------------------------------------

    #[test]
    fn missing_enumerates_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        assert_eq!(index.missing().count(), 0);

        put(&index, 0);
        put(&index, 420);
        assert_eq!(index.min(), Some(Identifier::zero()));
        assert_eq!(index.max(), Some(Identifier::from(420)));

        let missing: Vec<u64> = index.missing().map(|id| id.to_u64().unwrap()).collect();
        assert_eq!(missing.len(), 419);
        assert_eq!(missing.first(), Some(&1));
        assert_eq!(missing.last(), Some(&419));
        assert!(missing.windows(2).all(|w| w[0] + 1 == w[1]));
    }

    #[test]
    fn min_max_cover_archived_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        for id in 10..20 {
            put(&index, id);
        }
        put(&index, 33);
        index.compact_all();
        assert_eq!(index.min(), Some(Identifier::from(10)));
        assert_eq!(index.max(), Some(Identifier::from(33)));
        let missing: Vec<u64> = index.missing().map(|id| id.to_u64().unwrap()).collect();
        assert_eq!(missing, (20..33).collect::<Vec<_>>());
    }

    #[test]
    fn validation_isolates_broken_groups() {
        let dir = tempfile::tempdir().unwrap();
        let index = index(dir.path(), &[1, 1, 1]);
        for id in 0..40 {
            put(&index, id);
        }
        put(&index, 55);
        index.compact_all();
        assert!(index.validate_all(ValidationMode::CollectAll).is_valid());

        let root = dir.path();
        fs::remove_file(root.join("0/1.tgz")).unwrap();
        fs::write(root.join("0/2.tgz"), b"\x1f\x8bgarbage").unwrap();

        let report = index.validate_all(ValidationMode::CollectAll);
        assert_eq!(report.checked(), 5);
        let invalid: Vec<&str> = report.invalid().map(|(p, _)| p.as_str()).collect();
        assert_eq!(invalid, vec!["/0/1", "/0/2"]);

        let report = index.validate_all(ValidationMode::FailFast);
        assert_eq!(report.checked(), 2);
        assert!(!report.is_valid());
    }
}
