use anyhow::{Context, Result};
use memmap2::Mmap;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Exclusions;
use crate::error::PatchError;

#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path relative to the walked root, always with forward slashes.
    pub relative_path: String,
    pub full_path: PathBuf,
    /// File size in bytes. Free from the OS directory scan.
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct WalkResult {
    pub files: Vec<FileEntry>,
    /// Files skipped by extension plus directories pruned by name.
    pub excluded: usize,
}

/// Walk a directory tree and collect every regular file that survives the
/// deny-list, sorted by relative path.
pub fn walk_files(root: &Path, exclusions: &Exclusions) -> Result<WalkResult> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize path: {}", root.display()))?;

    let mut result = WalkResult::default();
    let mut pruned = 0usize;

    let walker = WalkDir::new(&root).min_depth(1).into_iter().filter_entry(|entry| {
        if entry.depth() > 0
            && entry.file_type().is_dir()
            && exclusions.excludes_dir(&entry.file_name().to_string_lossy()) {
            pruned += 1;
            return false;
        }
        true
    });

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to read directory entry in {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if exclusions.excludes_file(entry.path()) {
            result.excluded += 1;
            continue;
        }

        let full_path = entry.path().to_path_buf();
        let relative = full_path
            .strip_prefix(&root)
            .with_context(|| "Failed to compute relative path")?;
        let relative_path = to_archive_path(
            relative
                .to_str()
                .with_context(|| format!("Non-UTF8 path: {}", relative.display()))?,
        );

        let meta = entry
            .metadata()
            .with_context(|| format!("Failed to read metadata: {}", full_path.display()))?;

        result.files.push(FileEntry {
            relative_path,
            full_path,
            size: meta.len(),
        });
    }

    result.excluded += pruned;
    result.files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(result)
}

/// Native relative path to the `/`-separated form stored in archives.
/// Outside Windows a backslash is an ordinary filename character.
#[cfg(windows)]
fn to_archive_path(native: &str) -> String {
    native.replace('\\', "/")
}

#[cfg(not(windows))]
fn to_archive_path(native: &str) -> String {
    native.to_string()
}

/// Memory-map a file for read-only access. Empty files are read instead,
/// since zero-length mappings are rejected on some platforms.
///
/// # Safety
/// The mapping is read-only. Callers must not concurrently truncate or replace
/// the underlying file while the mapping is live.
pub fn mmap_file(path: &Path) -> Result<FileBytes> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?
        .len();
    if len == 0 {
        return Ok(FileBytes::Empty);
    }
    // SAFETY: We only read from this mapping; no concurrent modification of these files.
    let map = unsafe {
        Mmap::map(&file).with_context(|| format!("Failed to memory-map file: {}", path.display()))?
    };
    Ok(FileBytes::Mapped(map))
}

pub enum FileBytes {
    Mapped(Mmap),
    Empty,
}

impl std::ops::Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileBytes::Mapped(map) => map,
            FileBytes::Empty => &[],
        }
    }
}

/// Stream-hash a file using BLAKE3.
/// Uses a 256 KB BufReader to reduce syscall overhead vs the default 8 KB.
pub fn hash_file_streaming(path: &Path) -> Result<blake3::Hash> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = std::io::BufReader::with_capacity(256 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut reader, &mut hasher)
        .with_context(|| format!("Failed to hash file: {}", path.display()))?;
    Ok(hasher.finalize())
}

/// Join a forward-slash relative path from an archive onto `root`,
/// refusing anything that could land outside it.
pub fn safe_join(root: &Path, relative: &str) -> Result<PathBuf, PatchError> {
    let rel = Path::new(relative);
    let escapes = (cfg!(windows) && relative.contains('\\'))
        || rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if relative.is_empty() || escapes {
        return Err(PatchError::UnsafePath(relative.to_string()));
    }
    Ok(root.join(rel))
}
