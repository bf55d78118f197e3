use async_trait::async_trait;

use crate::progress::observer::ProgressListener;
use crate::types::types::{DownloadError, DownloadRequest};

/// Performs a single request and delivers the body to its destination.
///
/// The download manager runs at most one `fetch` at a time and drops the
/// future when the request is cancelled, so implementations must not rely
/// on running to completion.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        request: &DownloadRequest,
        progress: &dyn ProgressListener,
    ) -> Result<(), DownloadError>;
}
