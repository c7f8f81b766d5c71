//! Release binary downloads for host services.
//!
//! Binaries land in `<home>/<name>-<version>/<name>` and are reused by later
//! sessions.

use crate::{Error, Result};
use flate2::read::GzDecoder;
use playground_manifest::{Release, ReleaseFormat, host_platform};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

async fn download(url: String) -> Result<Vec<u8>> {
    smol::unblock(move || {
        let response = reqwest::blocking::get(&url)
            .map_err(|e| Error::Release(format!("GET {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Release(format!("GET {}: {}", url, status)));
        }
        let bytes = response
            .bytes()
            .map_err(|e| Error::Release(format!("GET {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    })
    .await
}

/// Unpack a gzipped tarball into a directory
pub fn unpack_tar_gz(archive: &[u8], dir: &Path) -> Result<()> {
    tar::Archive::new(GzDecoder::new(archive)).unpack(dir)?;
    Ok(())
}

/// First regular file called `name` below `dir`
pub fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.file_name().is_some_and(|f| f == name) {
            return Some(path);
        }
    }
    subdirs.iter().find_map(|sub| find_file(sub, name))
}

/// Unpack a zip archive into a directory
pub fn unpack_zip(archive: &[u8], dir: &Path) -> Result<()> {
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive))
        .map_err(|e| Error::Release(format!("bad zip archive: {}", e)))?;
    zip.extract(dir)
        .map_err(|e| Error::Release(format!("unzip into {}: {}", dir.display(), e)))
}

/// Path of a release binary, downloading and unpacking it on first use
pub async fn ensure_release(release: &Release, home: &Path) -> Result<PathBuf> {
    let dir = home.join(release.cache_key());
    let binary = dir.join(&release.name);
    if binary.is_file() {
        debug!("Using cached {}", binary.display());
        return Ok(binary);
    }

    let url = release.download_url(&host_platform())?;
    info!("Downloading {} from {}", release.cache_key(), url);
    let bytes = download(url).await?;
    async_fs::create_dir_all(&dir).await?;

    match release.format {
        ReleaseFormat::TarGz => {
            let target = dir.clone();
            smol::unblock(move || unpack_tar_gz(&bytes, &target)).await?;
        }
        ReleaseFormat::Zip => {
            let target = dir.clone();
            smol::unblock(move || unpack_zip(&bytes, &target)).await?;
        }
        ReleaseFormat::Binary => async_fs::write(&binary, bytes).await?,
    }

    if !binary.is_file() {
        let found = find_file(&dir, &release.name).ok_or_else(|| {
            Error::Release(format!("archive of {} has no file named {}", release.cache_key(), release.name))
        })?;
        async_fs::rename(&found, &binary).await?;
    }
    async_fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).await?;
    info!("Installed {}", binary.display());
    Ok(binary)
}
