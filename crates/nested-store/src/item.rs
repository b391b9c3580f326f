use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use nested_types::{Identifier, OBJECT_EXTENSION};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::group::Group;

/// Handle to one stored object.
///
/// An item only knows where its bytes live: a loose file in the group
/// directory, or a member of the group archive.
#[derive(Clone)]
pub struct Item {
    identifier: Identifier,
    group: Arc<Group>,
}

impl Item {
    pub(crate) fn new(identifier: Identifier, group: Arc<Group>) -> Self {
        Self { identifier, group }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn group(&self) -> &Arc<Group> {
        &self.group
    }

    /// Where the loose file lives, or would live, whether or not the group
    /// has been archived.
    pub fn path_in_store(&self) -> PathBuf {
        self.group.object_path(&self.identifier)
    }

    /// Member name inside the group archive.
    pub fn member_name(&self) -> String {
        self.group.path().member_name(&self.identifier)
    }

    pub fn is_archived(&self) -> bool {
        self.group.is_archived()
    }

    /// Open the object's bytes for reading.
    ///
    /// Loose files that are registered but not yet visible are retried per
    /// the store's [`RetryPolicy`](crate::RetryPolicy) before reporting
    /// [`StoreError::NotFound`].
    pub fn open(&self) -> StoreResult<ItemReader> {
        if self.group.is_archived() {
            let data = self.group.read_archived(&self.identifier)?;
            return Ok(ItemReader {
                inner: ReaderInner::Archived(Cursor::new(data)),
            });
        }
        let file = self.open_loose()?;
        Ok(ItemReader {
            inner: ReaderInner::Loose(BufReader::new(file)),
        })
    }

    /// Open and read the whole object.
    pub fn read_all(&self) -> StoreResult<Vec<u8>> {
        let mut reader = self.open()?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| StoreError::io(&self.path_in_store(), e))?;
        Ok(data)
    }

    fn open_loose(&self) -> StoreResult<File> {
        let path = self.path_in_store();
        let retry = self.group.retry();
        let attempts = retry.attempts.max(1);

        for attempt in 1..=attempts {
            match File::open(&path) {
                Ok(file) => return Ok(file),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if attempt < attempts {
                        debug!(identifier = %self.identifier, attempt, "loose object not visible yet");
                        thread::sleep(retry.backoff);
                    }
                }
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }

        warn!(
            identifier = %self.identifier,
            group = %self.group.path(),
            attempts,
            "loose object missing after retries"
        );
        Err(StoreError::NotFound {
            identifier: self.identifier.clone(),
            group: self.group.path().clone(),
        })
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("identifier", &self.identifier)
            .field("group", self.group.path())
            .finish()
    }
}

/// Readable bytes of one object.
pub struct ItemReader {
    inner: ReaderInner,
}

enum ReaderInner {
    Loose(BufReader<File>),
    Archived(Cursor<Vec<u8>>),
}

impl ItemReader {
    /// True if the bytes came from the group archive.
    pub fn is_archived(&self) -> bool {
        matches!(self.inner, ReaderInner::Archived(_))
    }
}

impl Read for ItemReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            ReaderInner::Loose(r) => r.read(buf),
            ReaderInner::Archived(r) => r.read(buf),
        }
    }
}

impl std::fmt::Debug for ItemReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemReader")
            .field("archived", &self.is_archived())
            .finish()
    }
}

/// Write sink for a new object.
///
/// Bytes go to a hidden staging file in the group directory. [`commit`]
/// renames it into place and only then registers the item, so a registered
/// item always has its bytes on disk. Dropping the writer without
/// committing removes the staging file.
///
/// [`commit`]: ItemWriter::commit
pub struct ItemWriter {
    group: Arc<Group>,
    identifier: Identifier,
    partial: PathBuf,
    file: Option<BufWriter<File>>,
    committed: bool,
}

impl ItemWriter {
    pub(crate) fn create(group: Arc<Group>, identifier: Identifier) -> StoreResult<Self> {
        let partial = group.partial_path(&identifier);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&partial)
            .map_err(|e| StoreError::io(&partial, e))?;
        Ok(Self {
            group,
            identifier,
            partial,
            file: Some(BufWriter::new(file)),
            committed: false,
        })
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Hidden file the bytes are staged in until commit.
    pub fn staging_path(&self) -> &Path {
        &self.partial
    }

    /// Flush, sync, and publish the object.
    pub fn commit(mut self) -> StoreResult<Item> {
        if let Some(writer) = self.file.take() {
            let file = writer
                .into_inner()
                .map_err(|e| StoreError::io(&self.partial, e.into_error()))?;
            file.sync_all().map_err(|e| StoreError::io(&self.partial, e))?;
        }
        let item = publish(&self.group, &self.identifier, &self.partial)?;
        self.committed = true;
        Ok(item)
    }
}

impl Write for ItemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "item writer already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for ItemWriter {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            if let Err(e) = fs::remove_file(&self.partial) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.partial.display(), error = %e, "staging file not removed");
                }
            }
        }
    }
}

impl std::fmt::Debug for ItemWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemWriter")
            .field("identifier", &self.identifier)
            .field("partial", &self.partial)
            .finish()
    }
}

/// Rename a fully written staging file into place and register the item.
pub(crate) fn publish(group: &Arc<Group>, id: &Identifier, staged: &Path) -> StoreResult<Item> {
    let target = group.object_path(id);
    fs::rename(staged, &target).map_err(|e| StoreError::io(&target, e))?;
    debug!(identifier = %id, group = %group.path(), "object published");
    Ok(group.add_item(id.clone()))
}

/// Identifier named by a loose object file such as `12345.bin`.
///
/// Only canonical names qualify: `007.bin` and hidden staging files are
/// rejected.
pub(crate) fn object_file_identifier(name: &str) -> Option<Identifier> {
    if name.starts_with('.') {
        return None;
    }
    let stem = name.strip_suffix(OBJECT_EXTENSION)?.strip_suffix('.')?;
    let id = Identifier::new(stem).ok()?;
    (id.as_str() == stem).then_some(id)
}
