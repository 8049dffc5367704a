//! Raw image materialization.
//!
//! Each sequence's photos arrive as one zip archive. The archive is streamed
//! to `images-<id>.zip.part`, renamed once complete, extracted into
//! `images-<id>.part/`, which is renamed to `images-<id>/` only after the
//! last entry is written. The archive is then deleted. An existing `images-<id>/` short-circuits
//! everything, and an existing `images-<id>.zip` skips the download.

use futures::StreamExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::FetchSettings;
use crate::error::FetchError;

/// Downloads and unpacks sequence image archives under `root`.
pub struct AssetFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
    root: PathBuf,
}

impl AssetFetcher {
    pub fn new(root: impl Into<PathBuf>, settings: FetchSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()?;

        Ok(AssetFetcher {
            client,
            settings,
            root: root.into(),
        })
    }

    pub fn image_dir(&self, sequence_id: i64) -> PathBuf {
        self.root.join(format!("images-{}", sequence_id))
    }

    pub fn archive_path(&self, sequence_id: i64) -> PathBuf {
        self.root.join(format!("images-{}.zip", sequence_id))
    }

    /// Extraction target, never mistaken for a finished image directory.
    pub fn staging_dir(&self, sequence_id: i64) -> PathBuf {
        self.root.join(format!("images-{}.part", sequence_id))
    }

    /// Make sure the raw images of `sequence_id` exist locally.
    ///
    /// # Returns
    /// * The extracted image directory
    ///
    /// # Errors
    /// * `FetchError` on network, HTTP status, archive or disk failure
    pub async fn ensure_images(&self, sequence_id: i64) -> Result<PathBuf, FetchError> {
        let image_dir = self.image_dir(sequence_id);
        if image_dir.is_dir() {
            log::debug!(
                "[Fetch] Images for {} already present at {}",
                sequence_id,
                image_dir.display()
            );
            return Ok(image_dir);
        }

        let archive = self.archive_path(sequence_id);
        if !archive.is_file() {
            self.download(sequence_id, &archive).await?;
        } else {
            log::info!("[Fetch] Reusing downloaded archive {}", archive.display());
        }

        // Leftovers of an extraction that never finished.
        let staging = self.staging_dir(sequence_id);
        if staging.exists() {
            log::warn!("[Fetch] Removing stale {}", staging.display());
            tokio::fs::remove_dir_all(&staging).await?;
        }

        log::info!("[Fetch] Unzipping {}", sequence_id);
        let archive_clone = archive.clone();
        let staging_clone = staging.clone();
        let extracted =
            tokio::task::spawn_blocking(move || extract_archive(&archive_clone, &staging_clone))
                .await
                .map_err(|e| FetchError::Join(e.to_string()))?;

        if let Err(e) = extracted {
            log::warn!(
                "[Fetch] Extraction of {} failed, discarding archive: {}",
                archive.display(),
                e
            );
            let _ = tokio::fs::remove_dir_all(&staging).await;
            let _ = tokio::fs::remove_file(&archive).await;
            return Err(e);
        }

        tokio::fs::rename(&staging, &image_dir).await?;
        tokio::fs::remove_file(&archive).await?;
        Ok(image_dir)
    }

    async fn download(&self, sequence_id: i64, archive: &Path) -> Result<(), FetchError> {
        let url = self.settings.url_for(sequence_id);
        log::info!("[Fetch] Fetching {} from {}", sequence_id, url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                id: sequence_id,
                status: status.as_u16(),
            });
        }

        let partial = archive.with_extension("zip.part");
        if let Some(parent) = partial.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut body = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(e.into());
                }
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, archive).await?;
        log::info!("[Fetch] Downloaded {} bytes for {}", written, sequence_id);
        Ok(())
    }
}

fn extract_archive(archive: &Path, dest: &Path) -> Result<(), FetchError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    std::fs::create_dir_all(dest)?;
    zip.extract(dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    fn sample_archive() -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default();
        writer.start_file("IMG_0001.jpg", options).unwrap();
        writer.write_all(b"first").unwrap();
        writer.start_file("turntable/IMG_0002.jpg", options).unwrap();
        writer.write_all(b"second").unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn fetcher_for(server: &mockito::Server, root: &Path) -> AssetFetcher {
        let settings = FetchSettings {
            url_template: format!("{}/download/images.zip?sequences={{id}}", server.url()),
            ..FetchSettings::default()
        };
        AssetFetcher::new(root, settings).unwrap()
    }

    #[tokio::test]
    async fn test_second_call_makes_no_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/download/images.zip")
            .match_query(mockito::Matcher::UrlEncoded(
                "sequences".into(),
                "7".into(),
            ))
            .with_status(200)
            .with_body(sample_archive())
            .expect(1)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let fetcher = fetcher_for(&server, temp_dir.path());

        let first = fetcher.ensure_images(7).await.unwrap();
        assert!(first.join("IMG_0001.jpg").is_file());
        assert!(first.join("turntable/IMG_0002.jpg").is_file());
        assert!(!fetcher.archive_path(7).exists());

        let second = fetcher.ensure_images(7).await.unwrap();
        assert_eq!(first, second);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_existing_archive_is_extracted_without_download() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let fetcher = fetcher_for(&server, temp_dir.path());
        std::fs::write(fetcher.archive_path(3), sample_archive()).unwrap();

        let dir = fetcher.ensure_images(3).await.unwrap();
        assert!(dir.join("IMG_0001.jpg").is_file());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/download/images.zip")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let temp_dir = TempDir::new().unwrap();
        let fetcher = fetcher_for(&server, temp_dir.path());

        let err = fetcher.ensure_images(9).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { id: 9, status: 503 }));
        assert!(!fetcher.image_dir(9).exists());
        assert!(!fetcher.archive_path(9).exists());
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_discarded() {
        let server = mockito::Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let fetcher = fetcher_for(&server, temp_dir.path());
        std::fs::write(fetcher.archive_path(5), b"definitely not a zip").unwrap();

        let err = fetcher.ensure_images(5).await.unwrap_err();
        assert!(matches!(err, FetchError::Archive(_)));
        assert!(!fetcher.image_dir(5).exists());
        assert!(!fetcher.staging_dir(5).exists());
        assert!(!fetcher.archive_path(5).exists());
    }

    #[tokio::test]
    async fn test_interrupted_extraction_is_redone() {
        let server = mockito::Server::new_async().await;
        let temp_dir = TempDir::new().unwrap();
        let fetcher = fetcher_for(&server, temp_dir.path());
        std::fs::write(fetcher.archive_path(6), sample_archive()).unwrap();
        let staging = fetcher.staging_dir(6);
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("IMG_0001.jpg"), b"fir").unwrap();

        let dir = fetcher.ensure_images(6).await.unwrap();

        assert_eq!(dir, fetcher.image_dir(6));
        assert_eq!(std::fs::read(dir.join("IMG_0001.jpg")).unwrap(), b"first");
        assert!(dir.join("turntable/IMG_0002.jpg").is_file());
        assert!(!staging.exists());
        assert!(!fetcher.archive_path(6).exists());
    }
}
