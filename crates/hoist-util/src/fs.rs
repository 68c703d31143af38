use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Ensure a directory exists, creating it and any parents if needed.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Ensure the parent directory of a file path exists.
pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) => ensure_dir(parent),
        None => Ok(()),
    }
}

/// Write bytes to `path` atomically: write a sibling temp file, fsync it,
/// then rename over the destination. Readers never see a partial file.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    ensure_parent(path)?;
    let tmp = sibling(path, ".part");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

/// Rename `src` onto `dst` after fsyncing `src`.
pub fn commit_rename(src: &Path, dst: &Path) -> std::io::Result<()> {
    let file = File::open(src)?;
    file.sync_all()?;
    std::fs::rename(src, dst)
}

/// Build a sibling path with `suffix` appended to the file name.
pub fn sibling(path: &Path, suffix: &str) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(suffix);
    path.with_file_name(name)
}

/// Age of a file in seconds based on its mtime, or `None` if it does not
/// exist or the clock went backwards.
pub fn file_age_secs(path: &Path) -> Option<u64> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?;
    std::time::SystemTime::now()
        .duration_since(mtime)
        .ok()
        .map(|d| d.as_secs())
}

/// Touch a file, creating it empty if needed and bumping its mtime.
pub fn touch(path: &Path) -> std::io::Result<()> {
    ensure_parent(path)?;
    let now = std::time::SystemTime::now();
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)?;
    file.set_modified(now)
}
