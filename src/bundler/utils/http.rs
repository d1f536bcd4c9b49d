//! HTTP downloads for remote package icons.

use crate::bundler::{Error, Result, collaborators::Downloader};
use std::time::Duration;
use url::Url;

const DOWNLOADER: &str = "http downloader";

/// Blocking reqwest downloader. Call it from a blocking context.
#[derive(Clone, Debug)]
pub struct HttpDownloader {
    timeout: Duration,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &Url) -> Result<Vec<u8>> {
        log::info!("Downloading {url}");

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::collaborator(DOWNLOADER, e))?;

        let response = client
            .get(url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::collaborator(DOWNLOADER, format!("download of {url} failed: {e}")))?;

        let bytes = response
            .bytes()
            .map_err(|e| Error::collaborator(DOWNLOADER, format!("failed to read response: {e}")))?;

        Ok(bytes.to_vec())
    }
}
