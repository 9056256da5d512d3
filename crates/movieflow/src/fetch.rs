//! Dataset fetcher: list, download and unzip into the staging directory.

use bytes::Bytes;
use movieflow_protocol::RunParams;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::catalog::{CatalogError, DatasetCatalog};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("invalid dataset archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive entry escapes the staging directory: {0}")]
    UnsafePath(String),

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOutput {
    /// Dataset references that were downloaded
    pub datasets: Vec<String>,
    /// Files written into the staging directory
    pub files: Vec<PathBuf>,
}

/// Download up to `params.quantity` matching datasets into `staging_dir`.
///
/// Fewer matches than requested downloads what is available; zero matches
/// succeeds with nothing written. Existing files are overwritten.
pub async fn fetch_datasets(
    catalog: &dyn DatasetCatalog,
    params: &RunParams,
    staging_dir: &Path,
) -> Result<FetchOutput, FetchError> {
    let listed = catalog.list_datasets(&params.search, params.sort_by).await?;
    let wanted = usize::try_from(params.quantity).unwrap_or(usize::MAX);
    info!(
        search = %params.search,
        sort_by = %params.sort_by,
        listed = listed.len(),
        quantity = params.quantity,
        "Listed catalog datasets"
    );

    let mut output = FetchOutput::default();
    for dataset in listed.into_iter().take(wanted) {
        let archive = catalog.download(&dataset).await?;
        let dir = staging_dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || extract_archive(archive, &dir)).await??;
        info!(
            dataset = %dataset.reference,
            files = files.len(),
            "Extracted dataset"
        );
        output.datasets.push(dataset.reference);
        output.files.extend(files);
    }
    Ok(output)
}

/// Unzip `archive` into `dest`, replacing existing files.
pub fn extract_archive(archive: Bytes, dest: &Path) -> Result<Vec<PathBuf>, FetchError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| FetchError::Io { path, source }
    };

    std::fs::create_dir_all(dest).map_err(io_err(dest))?;
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let mut written = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| FetchError::UnsafePath(entry.name().to_string()))?;
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(io_err(&target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut file = std::fs::File::create(&target).map_err(io_err(&target))?;
        std::io::copy(&mut entry, &mut file).map_err(io_err(&target))?;
        written.push(target);
    }
    Ok(written)
}
