//! ZIP bundle reading and writing.
//!
//! Entries are listed from the central directory and read one at a time, so
//! only the entry being translated is held in memory.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ArchiveError;
use crate::format::DocumentFormat;

/// One file listed in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Position in the archive's central directory.
    pub index: usize,
    /// Path inside the archive, `/` separated and unique within the listing.
    pub name: String,
    /// `None` when the extension is not one the pipeline knows.
    pub format: Option<DocumentFormat>,
}

impl ArchiveEntry {
    /// Whether the pipeline should try to translate this entry. Nested
    /// archives and unknown formats are skipped.
    pub fn is_translatable(&self) -> bool {
        self.format.is_some_and(|f| f.is_document())
    }
}

/// Read side of a bundle.
pub struct ArchiveReader {
    archive: ZipArchive<BufReader<File>>,
    entries: Vec<ArchiveEntry>,
}

impl ArchiveReader {
    /// Opens the archive at `path` and lists its file entries in archive order.
    ///
    /// Directory entries and entries whose names would escape the archive
    /// root are skipped. Fails with `InvalidArchive` for zero-byte or
    /// unreadable containers and with `EmptyArchive` when no file entry
    /// remains.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let read_err = |e: std::io::Error| ArchiveError::Read {
            path: path.to_path_buf(),
            source: e,
        };

        let file = File::open(path).map_err(read_err)?;
        if file.metadata().map_err(read_err)?.len() == 0 {
            return Err(ArchiveError::Invalid("archive file is empty".to_string()));
        }

        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| ArchiveError::Invalid(format!("Failed to open ZIP archive: {}", e)))?;
        let entries = list_entries(&mut archive)?;

        Ok(Self { archive, entries })
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Decompresses one entry. A damaged entry fails with
    /// [`ArchiveError::Entry`] and leaves the rest of the archive readable.
    pub fn read(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>, ArchiveError> {
        let entry_err = |reason: String| ArchiveError::Entry {
            name: entry.name.clone(),
            reason,
        };

        let mut file = self
            .archive
            .by_index(entry.index)
            .map_err(|e| entry_err(e.to_string()))?;
        let mut content = Vec::with_capacity(file.size().min(1 << 20) as usize);
        file.read_to_end(&mut content)
            .map_err(|e| entry_err(e.to_string()))?;

        debug!("Read archive entry {} ({} bytes)", entry.name, content.len());
        Ok(content)
    }
}

fn list_entries<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut entries = Vec::new();
    let mut seen = HashSet::new();

    for index in 0..archive.len() {
        let file = archive
            .by_index_raw(index)
            .map_err(|e| ArchiveError::Invalid(format!("Failed to read entry {}: {}", index, e)))?;

        if file.is_dir() {
            continue;
        }

        let Some(enclosed) = file.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {}", file.name());
            continue;
        };
        let name = normalize(&enclosed);
        if name.is_empty() {
            warn!("Skipping archive entry without a file name: {}", file.name());
            continue;
        }
        let name = unique_name(name, &mut seen);
        let format = DocumentFormat::from_path(Path::new(&name)).ok();
        entries.push(ArchiveEntry {
            index,
            name,
            format,
        });
    }

    if entries.is_empty() {
        return Err(ArchiveError::Empty);
    }

    Ok(entries)
}

/// Joins an enclosed path with `/`, folding `.` and `..` components.
fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            _ => {}
        }
    }
    parts.join("/")
}

/// Renames a repeated entry name to `{stem}_{n}.{ext}`.
fn unique_name(name: String, seen: &mut HashSet<String>) -> String {
    if seen.insert(name.clone()) {
        return name;
    }

    let path = Path::new(&name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("entry");
    let ext = path.extension().and_then(|e| e.to_str());
    let parent = match name.rfind('/') {
        Some(pos) => &name[..=pos],
        None => "",
    };

    let mut n = 2;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{}{}_{}.{}", parent, stem, n, ext),
            None => format!("{}{}_{}", parent, stem, n),
        };
        if seen.insert(candidate.clone()) {
            warn!("Duplicate archive entry {} renamed to {}", name, candidate);
            return candidate;
        }
        n += 1;
    }
}

/// Streams `(name in archive, file on disk)` pairs into a deflated ZIP at
/// `dest`. Returns `dest`.
pub fn pack<N: AsRef<str>>(files: &[(N, PathBuf)], dest: &Path) -> Result<PathBuf, ArchiveError> {
    let write_err = |reason: String| ArchiveError::Write {
        path: dest.to_path_buf(),
        reason,
    };

    let out = File::create(dest).map_err(|e| write_err(e.to_string()))?;
    let mut writer = ZipWriter::new(out);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for (name, path) in files {
        let name: &str = name.as_ref();
        let mut source = File::open(path).map_err(|e| ArchiveError::Read {
            path: path.clone(),
            source: e,
        })?;
        writer
            .start_file(name, options)
            .map_err(|e| write_err(format!("entry '{}': {}", name, e)))?;
        std::io::copy(&mut source, &mut writer)
            .map_err(|e| write_err(format!("entry '{}': {}", name, e)))?;
    }

    let out = writer.finish().map_err(|e| write_err(e.to_string()))?;
    out.sync_all().map_err(|e| write_err(e.to_string()))?;

    Ok(dest.to_path_buf())
}
