//! Downloads generated images into the output directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use genbatch_core::{JobId, ResultSink, SinkError};

/// Extension used when the downloaded bytes are not a recognised image.
pub const DEFAULT_EXTENSION: &str = "png";

/// [`ResultSink`] that fetches result URLs and writes them to disk as
/// `{YYYYmmdd_HHMMSS}_{job_id}.{ext}`.
#[derive(Debug, Clone)]
pub struct ImageDownloader {
    client: reqwest::Client,
    output_dir: PathBuf,
}

impl ImageDownloader {
    pub fn new(client: reqwest::Client, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `bytes` for `job_id` into the output directory.
    pub async fn write(&self, job_id: &str, bytes: &[u8]) -> Result<PathBuf, SinkError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| SinkError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        let name = result_file_name(Local::now().naive_local(), job_id, image_extension(bytes));
        let path = self.output_dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

#[async_trait]
impl ResultSink for ImageDownloader {
    async fn save(&self, job_id: &JobId, url: &str) -> Result<PathBuf, SinkError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SinkError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SinkError::Download(e.to_string()))?;

        let path = self.write(job_id, &bytes).await?;
        tracing::debug!(job_id = %job_id, path = %path.display(), bytes = bytes.len(), "Image written");
        Ok(path)
    }
}

/// File extension for the image in `bytes`, judged by its magic number.
pub fn image_extension(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or(DEFAULT_EXTENSION)
}

/// `{YYYYmmdd_HHMMSS}_{job_id}.{ext}`, with path-hostile characters in
/// the job id replaced by `_`.
pub fn result_file_name(at: NaiveDateTime, job_id: &str, ext: &str) -> String {
    let safe_id: String = job_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{safe_id}.{ext}", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(13, 4, 5)
            .unwrap()
    }

    #[test]
    fn file_name_has_timestamp_and_job_id() {
        assert_eq!(result_file_name(at(), "12", "png"), "20240501_130405_12.png");
    }

    #[test]
    fn file_name_sanitises_job_id() {
        assert_eq!(
            result_file_name(at(), "../a b", "jpg"),
            "20240501_130405____a_b.jpg"
        );
    }

    #[test]
    fn extension_follows_content() {
        assert_eq!(image_extension(PNG_MAGIC), "png");
        assert_eq!(image_extension(JPEG_MAGIC), "jpg");
        assert_eq!(image_extension(b"<html>not an image</html>"), DEFAULT_EXTENSION);
    }

    #[tokio::test]
    async fn write_creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = ImageDownloader::new(reqwest::Client::new(), dir.path().join("out"));

        let path = downloader.write("3", JPEG_MAGIC).await.unwrap();

        assert!(path.starts_with(dir.path().join("out")));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with("_3.jpg"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), JPEG_MAGIC);
    }
}
