use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures_util::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::{
    error::UploadError,
    types::{TranscodedFile, UploadTarget},
};

const CHUNK_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReceipt {
    pub bytes_sent: u64,
    pub status: u16,
}

/// Streams a transcoded file to an upload URL with `PUT`.
#[derive(Clone, Debug)]
pub struct ChunkedUploader {
    http: reqwest::Client,
}

impl ChunkedUploader {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http))
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn push(
        &self,
        file: &TranscodedFile,
        target: &UploadTarget,
    ) -> Result<UploadReceipt, UploadError> {
        let transfer_failed = |cause: String| UploadError::TransferFailed { cause };

        let source = File::open(&file.path)
            .await
            .map_err(|e| transfer_failed(format!("can't open {}: {}", file.path.display(), e)))?;
        let expected = source
            .metadata()
            .await
            .map_err(|e| transfer_failed(e.to_string()))?
            .len();

        let sent = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&sent);
        let stream = ReaderStream::with_capacity(source, CHUNK_SIZE).inspect_ok(move |chunk| {
            counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        });

        info!(url = %target.upload_url, bytes = expected, "uploading");

        let response = self
            .http
            .put(&target.upload_url)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, expected)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| transfer_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
            });
        }

        let bytes_sent = sent.load(Ordering::Relaxed);
        if bytes_sent != expected {
            return Err(UploadError::Incomplete {
                sent: bytes_sent,
                expected,
            });
        }

        info!(bytes_sent, status = status.as_u16(), "upload completed");

        Ok(UploadReceipt {
            bytes_sent,
            status: status.as_u16(),
        })
    }
}
