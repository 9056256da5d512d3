//! Removal of transient staging files.

use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Delete every regular file in `dir` whose extension is `extension`.
///
/// Not recursive. Subdirectories and other files are left alone. A missing
/// directory counts as empty. Returns the number of files removed.
pub fn remove_files_with_extension(dir: &Path, extension: &str) -> io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "Cleanup directory does not exist");
            return Ok(0);
        }
        Err(err) => return Err(err),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            // Removed concurrently by another run
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }

    info!(
        dir = %dir.display(),
        extension,
        removed,
        "Removed staging files"
    );
    Ok(removed)
}
