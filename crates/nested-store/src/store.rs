use std::fs;
use std::path::Path;

use nested_types::{Hierarchy, Identifier};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::index::{Index, Missing, PutOptions};
use crate::item::{Item, ItemReader, ItemWriter};
use crate::report::{CompactionReport, IngestReport, ValidationMode, ValidationReport};

/// The filestore: a thin layer over [`Index`] that owns the configuration.
#[derive(Debug)]
pub struct Filestore {
    index: Index,
}

impl Filestore {
    /// Open the store at `config.root`, creating the root directory if
    /// needed, and rebuild the catalog from disk.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let hierarchy = config.hierarchy()?;
        fs::create_dir_all(&config.root).map_err(|e| StoreError::io(&config.root, e))?;
        let index = Index::open(config.root, hierarchy, config.retry)?;
        Ok(Self { index })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn root(&self) -> &Path {
        self.index.root()
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        self.index.hierarchy()
    }

    pub fn exists(&self, id: &Identifier) -> bool {
        self.index.exists(id)
    }

    pub fn put_file(&self, id: &Identifier, source: &Path, options: PutOptions) -> StoreResult<Item> {
        self.index.put_file(id, source, options)
    }

    pub fn put_bytes(&self, id: &Identifier, data: &[u8], overwrite: bool) -> StoreResult<Item> {
        self.index.put_bytes(id, data, overwrite)
    }

    pub fn writer(&self, id: &Identifier, overwrite: bool) -> StoreResult<ItemWriter> {
        self.index.writer(id, overwrite)
    }

    /// Open a stored object for reading.
    pub fn get(&self, id: &Identifier) -> StoreResult<ItemReader> {
        self.index.get(id)?.open()
    }

    pub fn get_item(&self, id: &Identifier) -> StoreResult<Item> {
        self.index.get(id)
    }

    /// Move every `{id}.bin` file under `dir` into the store, in file name
    /// order. Files that are not named by an identifier, or whose identifier
    /// is already stored or archived, are left in place and reported.
    pub fn ingest_filesystem(&self, dir: &Path) -> StoreResult<IngestReport> {
        let mut report = IngestReport::default();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                StoreError::Io {
                    path,
                    source: e.into(),
                }
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("bin")
            {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            let id = match name.strip_suffix(".bin").map(Identifier::new) {
                Some(Ok(id)) if !name.starts_with('.') => id,
                _ => {
                    warn!(path = %path.display(), "file name is not an identifier; skipped");
                    report
                        .skipped
                        .push((path.to_path_buf(), "file name is not an identifier".into()));
                    continue;
                }
            };

            match self.index.put_file(&id, path, PutOptions::moved()) {
                Ok(_) => report.ingested += 1,
                Err(e) if e.is_recoverable() => {
                    warn!(path = %path.display(), error = %e, "object not ingested");
                    report.skipped.push((path.to_path_buf(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            source = %dir.display(),
            ingested = report.ingested,
            skipped = report.skipped.len(),
            "ingest finished"
        );
        Ok(report)
    }

    pub fn compact_all(&self) -> CompactionReport {
        self.index.compact_all()
    }

    pub fn validate_all(&self, mode: ValidationMode) -> ValidationReport {
        self.index.validate_all(mode)
    }

    pub fn missing(&self) -> Missing<'_> {
        self.index.missing()
    }

    pub fn min(&self) -> Option<Identifier> {
        self.index.min()
    }

    pub fn max(&self) -> Option<Identifier> {
        self.index.max()
    }
}
