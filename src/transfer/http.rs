use std::io::Read;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::transport::{PartResult, RemoteEntry, Scope, Transport, UploadSession};
use crate::TransferError;
use crate::cancel::CancelToken;

const API_TIMEOUT: Duration = Duration::from_secs(30);
// A blocking request cannot be interrupted once sent, so a cancel waits for the
// parts already in flight to finish or hit this timeout. A second Ctrl-C exits
// at once.
const PART_UPLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(serde::Deserialize)]
struct DownloadUrlResponse {
    #[serde(default)]
    url: String,
}

#[derive(Serialize)]
struct InitiateBody<'a> {
    file_path: &'a str,
    part_count: usize,
    region: &'a str,
}

#[derive(Serialize)]
struct CompleteBody<'a> {
    upload_id: &'a str,
    file_path: &'a str,
    parts: &'a [PartResult],
    region: &'a str,
}

/// `Transport` over the storage service's REST API.
pub struct HttpTransport {
    base_url: String,
    token: String,
    api: Client,
    // no total timeout: part PUTs set their own, download bodies stream as long as needed
    data: Client,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, TransferError> {
        let api = Client::builder()
            .timeout(API_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let data = Client::builder().timeout(None).connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            api,
            data,
        })
    }

    fn volume_url(&self, scope: &Scope, action: &str) -> String {
        format!("{}/v2/projects/{}/volumes/default/{}", self.base_url, scope.project_id, action)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.token)
            .header("X-Source", "cli")
            .header("X-CLI-Version", env!("CARGO_PKG_VERSION"))
    }

    fn send(&self, what: &str, req: RequestBuilder) -> Result<Response, TransferError> {
        let start = Instant::now();
        let resp = req.send().map_err(|e| TransferError::from(e).context(what))?;
        let status = resp.status();
        tracing::debug!("{} -> {} in {:?}", what, status, start.elapsed());
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(TransferError::api_status(
                status.as_u16(),
                format!("{} failed with status {}: {}", what, status.as_u16(), body.trim()),
            ));
        }
        Ok(resp)
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        what: &str,
        req: RequestBuilder,
    ) -> Result<T, TransferError> {
        let resp = self.send(what, req)?;
        resp.json::<T>()
            .map_err(|e| TransferError::api(format!("failed to parse {} response: {}", what, e)))
    }
}

fn check(cancel: &CancelToken) -> Result<(), TransferError> {
    if cancel.is_cancelled() {
        Err(TransferError::UserCancelled)
    } else {
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn initiate_upload(
        &self,
        cancel: &CancelToken,
        scope: &Scope,
        remote_path: &str,
        part_count: usize,
    ) -> Result<UploadSession, TransferError> {
        check(cancel)?;
        let body = InitiateBody { file_path: remote_path, part_count, region: &scope.region };
        let req = self
            .authed(self.api.post(self.volume_url(scope, "cp/initialize")))
            .query(&[("region", scope.region.as_str())])
            .json(&body);
        self.send_json("initiate upload", req)
    }

    fn upload_part(
        &self,
        cancel: &CancelToken,
        url: &str,
        data: &[u8],
    ) -> Result<String, TransferError> {
        check(cancel)?;
        tracing::debug!("uploading part: {} bytes", data.len());
        let req = self
            .data
            .put(url)
            .timeout(PART_UPLOAD_TIMEOUT)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data.to_vec());
        let resp = self.send("upload part", req)?;
        let etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(etag)
    }

    fn complete_upload(
        &self,
        cancel: &CancelToken,
        scope: &Scope,
        remote_path: &str,
        upload_id: &str,
        parts: &[PartResult],
    ) -> Result<(), TransferError> {
        check(cancel)?;
        let body = CompleteBody { upload_id, file_path: remote_path, parts, region: &scope.region };
        let req = self
            .authed(self.api.post(self.volume_url(scope, "cp/complete")))
            .query(&[("region", scope.region.as_str())])
            .json(&body);
        self.send("complete upload", req).map(|_| ())
    }

    fn get_download_url(
        &self,
        cancel: &CancelToken,
        scope: &Scope,
        remote_path: &str,
    ) -> Result<String, TransferError> {
        check(cancel)?;
        let req = self
            .authed(self.api.get(self.volume_url(scope, "download")))
            .query(&[("region", scope.region.as_str()), ("file_path", remote_path)]);
        let resp: DownloadUrlResponse = self.send_json("get download url", req)?;
        if resp.url.is_empty() {
            return Err(TransferError::api("no download URL in response"));
        }
        Ok(resp.url)
    }

    fn open_download(
        &self,
        cancel: &CancelToken,
        url: &str,
    ) -> Result<Box<dyn Read + Send>, TransferError> {
        check(cancel)?;
        let resp = self.send("download", self.data.get(url))?;
        Ok(Box::new(resp))
    }

    fn list_directory(
        &self,
        cancel: &CancelToken,
        scope: &Scope,
        remote_path: &str,
    ) -> Result<Vec<RemoteEntry>, TransferError> {
        check(cancel)?;
        let req = self
            .authed(self.api.get(self.volume_url(scope, "ls")))
            .query(&[("region", scope.region.as_str()), ("dir", remote_path)]);
        self.send_json("list directory", req)
    }
}
