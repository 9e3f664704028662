use std::path::{Path, PathBuf};

use log::warn;

use crate::error::StorageError;

const UPLOADS_DIR: &str = "uploads";
const RESULTS_DIR: &str = "results";
const TMP_DIR: &str = "tmp";
const QUEUE_DIR: &str = "queue";

/// On-disk layout of the data directory. Everything a job owns lives under
/// a directory named after its id, so jobs never share files.
///
/// ```text
/// {root}/uploads/{id}/{original_name}
/// {root}/results/{id}/{artifact}
/// {root}/tmp/{id}/attempt-{n}/
/// {root}/queue/{id}.json
/// ```
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_root(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    pub fn results_root(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    pub fn tmp_root(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.root.join(QUEUE_DIR)
    }

    pub fn results_dir(&self, job_id: &str) -> PathBuf {
        self.results_root().join(job_id)
    }

    pub fn attempt_dir(&self, job_id: &str, attempt: u32) -> PathBuf {
        self.tmp_root()
            .join(job_id)
            .join(format!("attempt-{}", attempt))
    }

    /// Creates the top-level directories.
    pub fn initialize(&self) -> Result<(), StorageError> {
        for dir in [
            self.uploads_root(),
            self.results_root(),
            self.tmp_root(),
            self.queue_dir(),
        ] {
            ensure_directory(&dir)?;
        }
        Ok(())
    }

    /// Writes an upload to `uploads/{id}/{name}` and syncs it to disk before
    /// returning, so the file exists before the job is enqueued.
    pub fn store_upload(
        &self,
        job_id: &str,
        original_name: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let name = safe_file_name(original_name)?;
        let dir = self.uploads_root().join(job_id);
        ensure_directory(&dir)?;

        let path = dir.join(name);
        write_synced(&path, content)?;
        Ok(path)
    }

    /// Writes a result artifact into the job's result directory, replacing
    /// any artifact of the same name left by an earlier attempt.
    pub fn store_result(
        &self,
        job_id: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir = self.results_dir(job_id);
        ensure_directory(&dir)?;
        let path = dir.join(safe_file_name(file_name)?);
        write_atomic(&path, content)?;
        Ok(path)
    }

    /// Moves a file built in a temp directory into the job's result
    /// directory under `file_name`, replacing an earlier artifact.
    pub fn promote_result(
        &self,
        job_id: &str,
        built: &Path,
        file_name: &str,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.results_dir(job_id);
        ensure_directory(&dir)?;
        let path = dir.join(safe_file_name(file_name)?);
        move_file(built, &path)?;
        Ok(path)
    }

    /// Creates a fresh temp directory for one attempt of a job, clearing
    /// anything a crashed earlier run left at the same path.
    pub fn create_attempt_dir(&self, job_id: &str, attempt: u32) -> Result<PathBuf, StorageError> {
        let dir = self.attempt_dir(job_id, attempt);
        if dir.exists() {
            remove_dir_best_effort(&dir);
        }
        ensure_directory(&dir)?;
        Ok(dir)
    }

    /// Removes an attempt directory and, once it is the last one, the job's
    /// temp directory.
    pub fn cleanup_attempt_dir(&self, job_id: &str, attempt: u32) {
        remove_dir_best_effort(&self.attempt_dir(job_id, attempt));
        let job_tmp = self.tmp_root().join(job_id);
        // Fails while other attempts still hold files; that is fine.
        let _ = std::fs::remove_dir(&job_tmp);
    }

    /// Removes every attempt directory of a job. Only safe while no worker
    /// runs the job, such as during start-up recovery.
    pub fn remove_job_tmp(&self, job_id: &str) {
        remove_dir_best_effort(&self.tmp_root().join(job_id));
    }

    /// Deletes the uploaded source and its per-job directory. Returns whether
    /// anything was removed.
    pub fn remove_upload(&self, source_path: &Path) -> Result<bool, StorageError> {
        let removed = remove_file_if_exists(source_path)?;
        if let Some(parent) = source_path.parent() {
            if parent.starts_with(self.uploads_root()) && parent != self.uploads_root() {
                let _ = std::fs::remove_dir(parent);
            }
        }
        Ok(removed)
    }
}

pub(crate) fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

/// Renames `src` to `dst`, falling back to copy and delete when the two
/// live on different filesystems.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    let content = std::fs::read(src).map_err(|e| StorageError::ReadFile {
        path: src.to_path_buf(),
        source: e,
    })?;
    write_atomic(dst, &content)?;
    remove_file_if_exists(src)?;
    Ok(())
}

/// Writes to `{path}.part` and renames it into place.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    write_synced(&part, content)?;
    std::fs::rename(&part, path).map_err(|e| {
        let _ = std::fs::remove_file(&part);
        StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

fn write_synced(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    use std::io::Write;

    let to_err = |e: std::io::Error| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = std::fs::File::create(path).map_err(to_err)?;
    file.write_all(content).map_err(to_err)?;
    file.sync_all().map_err(to_err)
}

/// Removes a file; a file that is already gone is not an error. Returns
/// whether the file existed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool, StorageError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Recursively removes a directory, logging instead of failing.
pub fn remove_dir_best_effort(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove directory {}: {}", path.display(), e),
    }
}

/// Reduces a client-supplied name to its final component and rejects names
/// that would leave the job directory.
fn safe_file_name(name: &str) -> Result<&str, StorageError> {
    let candidate = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if candidate.is_empty() || candidate == "." || candidate == ".." {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let storage = FileStorage::new("/data");
        assert_eq!(storage.results_dir("j1"), PathBuf::from("/data/results/j1"));
        assert_eq!(
            storage.attempt_dir("j1", 2),
            PathBuf::from("/data/tmp/j1/attempt-2")
        );
        assert_eq!(storage.queue_dir(), PathBuf::from("/data/queue"));
    }

    #[test]
    fn test_store_upload() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let path = storage.store_upload("job-1", "hello.txt", b"Hello").unwrap();
        assert_eq!(path, temp_dir.path().join("uploads/job-1/hello.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"Hello");
    }

    #[test]
    fn test_store_upload_strips_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let path = storage
            .store_upload("job-1", "../../etc/passwd.txt", b"x")
            .unwrap();
        assert!(path.starts_with(temp_dir.path().join("uploads/job-1")));
        assert!(path.ends_with("passwd.txt"));
    }

    #[test]
    fn test_store_upload_rejects_empty_name() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        for name in ["", "dir/", ".."] {
            let result = storage.store_upload("job-1", name, b"x");
            assert!(matches!(result, Err(StorageError::InvalidName(_))), "{name}");
        }
    }

    #[test]
    fn test_store_result_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let first = storage.store_result("job-1", "out.txt", b"first").unwrap();
        let second = storage.store_result("job-1", "out.txt", b"second").unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(&second).unwrap(), b"second");
        assert!(!temp_dir.path().join("results/job-1/out.txt.part").exists());
    }

    #[test]
    fn test_promote_result_moves_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        let attempt = storage.create_attempt_dir("job-1", 1).unwrap();
        let built = attempt.join("bundle.zip");
        std::fs::write(&built, b"PK").unwrap();

        let path = storage
            .promote_result("job-1", &built, "translated_to_es_bundle.zip")
            .unwrap();

        assert!(!built.exists());
        assert_eq!(
            path,
            temp_dir.path().join("results/job-1/translated_to_es_bundle.zip")
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"PK");
    }

    #[test]
    fn test_promote_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let result = storage.promote_result("job-1", &temp_dir.path().join("nope.zip"), "x.zip");
        assert!(matches!(result, Err(StorageError::ReadFile { .. })));
    }

    #[test]
    fn test_attempt_dir_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let dir = storage.create_attempt_dir("job-1", 1).unwrap();
        std::fs::write(dir.join("leftover.txt"), b"x").unwrap();

        let again = storage.create_attempt_dir("job-1", 1).unwrap();
        assert!(!again.join("leftover.txt").exists());

        storage.cleanup_attempt_dir("job-1", 1);
        assert!(!dir.exists());
        assert!(!temp_dir.path().join("tmp/job-1").exists());
    }

    #[test]
    fn test_remove_job_tmp_clears_all_attempts() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        let first = storage.create_attempt_dir("job-1", 1).unwrap();
        std::fs::write(first.join("partial.txt"), b"x").unwrap();
        storage.create_attempt_dir("job-1", 2).unwrap();
        let other = storage.create_attempt_dir("job-2", 1).unwrap();

        storage.remove_job_tmp("job-1");
        storage.remove_job_tmp("never-ran");

        assert!(!temp_dir.path().join("tmp/job-1").exists());
        assert!(other.exists());
    }

    #[test]
    fn test_remove_upload_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        let path = storage.store_upload("job-1", "a.txt", b"x").unwrap();

        assert!(storage.remove_upload(&path).unwrap());
        assert!(!storage.remove_upload(&path).unwrap());
        assert!(!temp_dir.path().join("uploads/job-1").exists());
    }

    #[test]
    fn test_initialize_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("data"));
        storage.initialize().unwrap();

        for dir in ["uploads", "results", "tmp", "queue"] {
            assert!(temp_dir.path().join("data").join(dir).is_dir());
        }
    }
}
