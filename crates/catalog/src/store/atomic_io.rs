use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes `bytes` next to `path` first and then swaps the file into place, so a
/// crash mid-write leaves either the previous snapshot or the new one.
pub(crate) fn write_snapshot_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let staging = staging_path_for(path);
    fs::write(&staging, bytes)?;
    swap_into_place(&staging, path)
}

fn swap_into_place(staging: &Path, final_path: &Path) -> io::Result<()> {
    // Windows refuses to rename over an existing file.
    if cfg!(windows) {
        match fs::remove_file(final_path) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                let _ = fs::remove_file(staging);
                return Err(error);
            }
        }
    }

    if let Err(error) = fs::rename(staging, final_path) {
        let _ = fs::remove_file(staging);
        return Err(error);
    }
    Ok(())
}

fn staging_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("catalog.db");
    let staging_name = format!(".{file_name}.staging");
    match path.parent() {
        Some(parent) => parent.join(staging_name),
        None => PathBuf::from(staging_name),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn overwrites_existing_snapshot_and_leaves_no_staging_file() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("nested").join("catalog.db");

        write_snapshot_atomic(&path, b"first").expect("first write");
        write_snapshot_atomic(&path, b"second").expect("second write");

        assert_eq!(fs::read(&path).expect("read"), b"second");
        assert!(!staging_path_for(&path).exists());
    }
}
