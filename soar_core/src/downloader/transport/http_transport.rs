use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use super::download_transport::Transport;
use crate::config::TransportConfig;
use crate::progress::observer::ProgressListener;
use crate::types::types::{Destination, DownloadError, DownloadRequest, RequestData};

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, DownloadError> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_request(&self, request: &DownloadRequest) -> reqwest::RequestBuilder {
        let data = &request.data;
        let builder = if data.is_post() {
            self.client.post(&request.uri)
        } else {
            self.client.get(&request.uri)
        };

        let auth_header = precompute_auth(data);
        let mut builder = apply_headers(builder, data, auth_header.as_deref());

        if !data.form.is_empty() {
            let form = data
                .form
                .iter()
                .fold(reqwest::multipart::Form::new(), |form, (key, value)| {
                    form.text(key.clone(), value.clone())
                });
            builder = builder.multipart(form);
        } else if let Some(body) = &data.body {
            builder = builder.body(body.clone());
        }
        builder
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        request: &DownloadRequest,
        progress: &dyn ProgressListener,
    ) -> Result<(), DownloadError> {
        if request.data.body.is_some() && !request.data.form.is_empty() {
            return Err(DownloadError::InvalidRequest(format!(
                "{}: a request carries either a body or form fields, not both",
                request.name
            )));
        }

        log::info!(
            "[http_transport] {} {} ({:?} '{}')",
            if request.data.is_post() { "POST" } else { "GET" },
            request.uri,
            request.kind(),
            request.name
        );

        let response = self.build_request(request).send().await?;
        log::debug!(
            "[http_transport] {}: status={}, content_length={:?}",
            request.name,
            response.status(),
            response.content_length()
        );

        match &request.destination {
            Destination::File(path) => download_to_file(response, path, &request.data, progress).await,
            Destination::Json(slot) => {
                let body = read_body(response, progress).await?;
                slot.set(serde_json::from_slice(&body)?);
                Ok(())
            }
            Destination::Buffer(slot) => {
                let body = read_body(response, progress).await?;
                slot.set(body);
                Ok(())
            }
        }
    }
}

/// Applies custom headers and the auth header to a request builder.
fn apply_headers(
    mut builder: reqwest::RequestBuilder,
    data: &RequestData,
    precomputed_auth: Option<&str>,
) -> reqwest::RequestBuilder {
    for (key, values) in &data.headers {
        for value in values {
            builder = builder.header(key, value);
        }
    }
    if let Some(auth_value) = precomputed_auth {
        builder = builder.header("Authorization", auth_value);
    }
    builder
}

/// Pre-computes the Basic auth header value, if authentication is configured.
fn precompute_auth(data: &RequestData) -> Option<String> {
    data.authentication.as_ref().map(|auth| {
        let credentials = format!("{}:{}", auth.username, auth.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&credentials);
        format!("Basic {}", encoded)
    })
}

fn is_success(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 201)
}

fn status_error(response: &Response) -> DownloadError {
    DownloadError::HttpStatus {
        url: response.url().to_string(),
        status: response.status().as_u16(),
    }
}

/// Collects the whole body in memory. Only 200 and 201 are accepted.
async fn read_body(response: Response, progress: &dyn ProgressListener) -> Result<Vec<u8>, DownloadError> {
    if !is_success(response.status()) {
        return Err(status_error(&response));
    }

    if let Some(len) = response.content_length() {
        progress.set_progress_range(len);
    }

    let mut body = Vec::with_capacity(response.content_length().unwrap_or(0).min(1 << 20) as usize);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        body.extend_from_slice(&chunk);
        progress.set_progress_position(body.len() as u64);
    }
    Ok(body)
}

/// Streams the body into a sibling temp file and renames it over `path` on
/// success, so an existing file is only replaced by a complete download.
///
/// A 401 response with a body keeps that body next to the target as
/// `<path>.json`, since such servers describe the failure in JSON.
async fn download_to_file(
    response: Response,
    path: &Path,
    data: &RequestData,
    progress: &dyn ProgressListener,
) -> Result<(), DownloadError> {
    let status = response.status();
    if !is_success(status) && status != StatusCode::UNAUTHORIZED {
        return Err(status_error(&response));
    }
    let error = status_error(&response);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    if let Some(len) = response.content_length() {
        progress.set_progress_range(len);
    }

    let mut partial = PartialFile::new(temp_path_for(path));
    let (written, digest) = stream_to_file(response, partial.path(), progress).await?;

    if is_success(status) {
        partial.commit(path).await?;
        if let Some(slot) = &data.sha256 {
            slot.set(digest);
        }
        log::info!("[http_transport] saved {} ({} bytes)", path.display(), written);
        return Ok(());
    }

    if written > 0 {
        let error_path = with_suffix(path, ".json");
        partial.commit(&error_path).await?;
        log::warn!(
            "[http_transport] unauthorized, server response kept in {}",
            error_path.display()
        );
    }
    Err(error)
}

async fn stream_to_file(
    response: Response,
    path: &Path,
    progress: &dyn ProgressListener,
) -> Result<(u64, [u8; 32]), DownloadError> {
    let file = tokio::fs::File::create(path).await?;
    let mut writer = tokio::io::BufWriter::with_capacity(256 * 1024, file);
    let mut hasher = Sha256::new();
    let mut position: u64 = 0;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        hasher.update(&chunk);
        position += chunk.len() as u64;
        progress.set_progress_position(position);
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    Ok((position, digest))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4()))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// A temp file that is removed unless committed, including when the
/// download future is dropped half-way.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn commit(&mut self, target: &Path) -> Result<(), DownloadError> {
        tokio::fs::rename(&self.path, target).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
