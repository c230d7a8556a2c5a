//! Runtime archive download with progress tracking

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use indicatif::ProgressBar;
use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::error::{InstallError, Result};

// Download timeout defaults (connect / no data received)
pub const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DOWNLOAD_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Something that can place the bytes behind a URL into a local file
pub trait ArchiveFetcher {
    /// Fetch `url` into `dest`, returning the number of bytes written
    fn fetch(&self, url: &str, dest: &Path) -> impl Future<Output = Result<u64>> + Send;
}

/// Streams archives over HTTP(S) with reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    connect_timeout: Duration,
    inactivity_timeout: Duration,
    progress: ProgressBar,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DOWNLOAD_CONNECT_TIMEOUT, DOWNLOAD_INACTIVITY_TIMEOUT)
    }
}

impl HttpFetcher {
    pub fn new(connect_timeout: Duration, inactivity_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            inactivity_timeout,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report download progress on the given bar
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let failure = |message: String| InstallError::DownloadFailure {
            url: url.to_string(),
            message,
        };

        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(concat!("dchess-installer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| failure(e.to_string()))?;

        let response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failure(e.to_string()))?;

        let total_bytes = response.content_length();
        if let Some(total) = total_bytes {
            self.progress.set_length(total);
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| InstallError::io(dest, e))?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let chunk = match timeout(self.inactivity_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(failure(e.to_string())),
                Ok(None) => break,
                Err(_) => {
                    return Err(failure(format!(
                        "no data received for {} seconds after {downloaded} bytes",
                        self.inactivity_timeout.as_secs()
                    )));
                }
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| InstallError::io(dest, e))?;
            downloaded += chunk.len() as u64;
            self.progress.set_position(downloaded);
        }

        file.flush().await.map_err(|e| InstallError::io(dest, e))?;

        if let Some(total) = total_bytes
            && downloaded != total
        {
            return Err(failure(format!(
                "connection closed after {downloaded} of {total} bytes"
            )));
        }

        self.progress.finish_and_clear();
        Ok(downloaded)
    }
}

impl ArchiveFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        info!("Downloading runtime from {url}");
        match self.download(url, dest).await {
            Ok(bytes) => {
                info!("Downloaded {bytes} bytes to {}", dest.display());
                Ok(bytes)
            }
            Err(e) => {
                warn!("Runtime download failed: {e}");
                self.progress.abandon();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_download_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("runtime-archive.zip");

        let fetcher = HttpFetcher::new(Duration::from_secs(2), Duration::from_secs(2));
        // port 9 (discard) on localhost is essentially never listening
        let err = fetcher
            .fetch("http://127.0.0.1:9/jdk.zip", &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::DownloadFailure { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url_is_download_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::default();

        let err = fetcher
            .fetch("not a url", &tmp.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::DownloadFailure { .. }));
    }
}
