use crate::config::{ClientConfig, host_for};
use crate::traits::{RequestBody, Transport};
use crate::signing;
use crate::types::{MwsError, Params, Result};
use crate::xml;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use md5::{Digest, Md5};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::Duration;
use tempfile::{NamedTempFile, SpooledTempFile};
use tracing::{debug, info, warn};
use url::Url;

pub const API_VERSION: &str = "2009-01-01";
const FEED_CONTENT_TYPE: &str = "text/xml; charset=UTF-8";

/// Response payload, in memory or spilled to a temporary file.
pub struct ResponseBody {
    inner: SpooledTempFile,
    len: u64,
}

impl ResponseBody {
    pub fn spooled(threshold: usize) -> Self {
        Self {
            inner: SpooledTempFile::new(threshold),
            len: 0,
        }
    }

    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        let mut body = Self::spooled(bytes.len().max(1));
        // Writes to an in-memory buffer cannot fail.
        let _ = body.append(bytes);
        let _ = body.rewind();
        body
    }

    pub fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.inner.write_all(chunk)?;
        self.len += chunk.len() as u64;
        Ok(())
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(0)).map(|_| ())
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_on_disk(&self) -> bool {
        self.inner.is_rolled()
    }

    pub fn into_string(mut self) -> Result<String> {
        self.rewind()?;
        let mut bytes = Vec::with_capacity(self.len as usize);
        self.inner.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for ResponseBody {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("len", &self.len)
            .field("on_disk", &self.is_on_disk())
            .finish()
    }
}

/// Bytes sent and received since the counters were last taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub bytes_out: u64,
    pub bytes_in: u64,
}

/// A POST body copied to disk so its length and digest are known up front.
struct SpooledRequest {
    file: NamedTempFile,
    len: u64,
    md5: String,
}

impl SpooledRequest {
    fn from_reader(mut body: RequestBody, dir: &std::path::Path) -> Result<Self> {
        let mut file = tempfile::Builder::new().prefix("mws-request-").tempfile_in(dir)?;
        let len = io::copy(&mut body, &mut file)?;
        file.flush()?;
        file.seek(SeekFrom::Start(0))?;

        let mut hasher = Md5::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            file,
            len,
            md5: STANDARD.encode(hasher.finalize()),
        })
    }
}

pub struct TransportClient {
    http: Client,
    config: ClientConfig,
    endpoint: Url,
    marketplace_id: String,
    clock_delta: TimeDelta,
    stats: TransportStats,
}

impl TransportClient {
    /// Validates the configuration, selects the locale host and synchronizes
    /// the clock with the service.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let marketplace_id = config.marketplace_id.trim().to_string();
        let endpoint = config.endpoint_for(&marketplace_id)?;
        info!("Selected locale {} ({})", marketplace_id, endpoint);

        let mut client = Self {
            http: build_http(&config)?,
            config,
            endpoint,
            marketplace_id,
            clock_delta: TimeDelta::zero(),
            stats: TransportStats::default(),
        };
        client.sync_clock().await;
        Ok(client)
    }

    /// Switches to the host of another known marketplace.
    pub async fn set_locale(&mut self, marketplace_id: &str) -> Result<()> {
        let marketplace_id = marketplace_id.trim().to_uppercase();
        if host_for(&marketplace_id).is_none() {
            return Err(MwsError::Config(format!("Unknown marketplace {}", marketplace_id)));
        }
        self.endpoint = self.config.endpoint_for(&marketplace_id)?;
        self.http = build_http(&self.config)?;
        self.marketplace_id = marketplace_id;
        info!("Selected locale {} ({})", self.marketplace_id, self.endpoint);
        self.sync_clock().await;
        Ok(())
    }

    /// Reads the service time from the endpoint root. Failures keep the
    /// previous delta.
    pub async fn sync_clock(&mut self) {
        match self.fetch_server_time().await {
            Ok(server_time) => {
                self.clock_delta = server_time - Utc::now();
                debug!("Clock delta: {}s", self.clock_delta.num_seconds());
            }
            Err(e) => warn!("Failed to synchronize clock with {}: {}", self.endpoint, e),
        }
    }

    async fn fetch_server_time(&mut self) -> Result<DateTime<Utc>> {
        let response = self.http.get(self.endpoint.clone()).send().await?;
        let status = response.status();
        let text = response.text().await?;
        self.stats.bytes_in += text.len() as u64;
        if status != StatusCode::OK {
            let (server_code, server_message) = xml::error_details(&text);
            return Err(MwsError::Transport { status: status.as_u16(), server_code, server_message });
        }

        let document = xml::parse_document(&text)?;
        let stamp = document
            .child("Timestamp")
            .and_then(|node| node.attr("timestamp"))
            .ok_or_else(|| MwsError::missing("Timestamp"))?;
        DateTime::parse_from_rfc3339(stamp)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|e| MwsError::XmlParse { line: 1, message: format!("Bad timestamp {}: {}", stamp, e) })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn clock_delta(&self) -> TimeDelta {
        self.clock_delta
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    pub fn take_stats(&mut self) -> TransportStats {
        std::mem::take(&mut self.stats)
    }

    fn prepare_params(&self, action: &str, mut params: Params) -> Params {
        params.insert("Action".to_string(), action.to_string());
        params.insert("Marketplace".to_string(), self.marketplace_id.clone());
        params.insert("Merchant".to_string(), self.config.merchant_id.clone());
        params
            .entry("Version".to_string())
            .or_insert_with(|| API_VERSION.to_string());
        params.insert("AWSAccessKeyId".to_string(), self.config.access_key_id.clone());
        if let Some(token) = &self.config.auth_token {
            params.insert("MWSAuthToken".to_string(), token.clone());
        }
        params.insert(
            "Timestamp".to_string(),
            signing::format_timestamp(self.server_now()),
        );
        params
    }

    async fn execute(
        &mut self,
        action: &str,
        params: Params,
        body: Option<RequestBody>,
    ) -> Result<ResponseBody> {
        let method = if body.is_some() { Method::POST } else { Method::GET };
        let mut params = self.prepare_params(action, params);
        let host = self.endpoint.host_str().unwrap_or_default().to_string();
        let path = self.endpoint.path().to_string();
        let query = signing::signed_query(
            method.as_str(),
            &host,
            &path,
            &mut params,
            &self.config.secret_key,
        )?;
        let mut url = self.endpoint.clone();
        url.set_query(Some(&query));

        debug!("Calling {} via {}", action, method);
        let mut bytes_out = (method.as_str().len() + url.as_str().len()) as u64;

        // Kept alive until the response has been read.
        let spooled = match body {
            Some(body) => Some(SpooledRequest::from_reader(body, &self.config.tmp_dir)?),
            None => None,
        };

        let request = match &spooled {
            Some(spooled) => {
                bytes_out += spooled.len;
                let file = tokio::fs::File::from_std(spooled.file.reopen()?);
                self.http
                    .post(url)
                    .timeout(Duration::from_secs(self.config.post_timeout_seconds))
                    .header(CONTENT_TYPE, FEED_CONTENT_TYPE)
                    .header(CONTENT_LENGTH, spooled.len)
                    .header("Content-MD5", spooled.md5.as_str())
                    .body(reqwest::Body::from(file))
            }
            None => self.http.get(url),
        };

        let mut response = request.send().await?;
        self.stats.bytes_out += bytes_out;
        let status = response.status();
        self.stats.bytes_in += response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().len() + value.len() + 4) as u64)
            .sum::<u64>();

        let mut payload = ResponseBody::spooled(self.config.memory_threshold);
        while let Some(chunk) = response.chunk().await? {
            payload.append(&chunk)?;
        }
        self.stats.bytes_in += payload.len();
        payload.rewind()?;
        drop(spooled);

        if status != StatusCode::OK {
            let text = payload.into_string()?;
            let (server_code, server_message) = xml::error_details(&text);
            warn!(
                "{} failed with HTTP {}: {}",
                action,
                status.as_u16(),
                server_message.as_deref().unwrap_or("undefined error")
            );
            return Err(MwsError::Transport {
                status: status.as_u16(),
                server_code,
                server_message,
            });
        }

        debug!("{} returned {} bytes", action, payload.len());
        Ok(payload)
    }
}

#[async_trait]
impl Transport for TransportClient {
    async fn call(
        &mut self,
        action: &str,
        params: Params,
        body: Option<RequestBody>,
    ) -> Result<ResponseBody> {
        self.execute(action, params, body).await
    }

    fn marketplace_id(&self) -> &str {
        &self.marketplace_id
    }

    fn merchant_id(&self) -> &str {
        &self.config.merchant_id
    }

    fn merchant_identifier(&self) -> &str {
        self.config.merchant_identifier()
    }

    fn server_now(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_delta
    }
}

fn build_http(config: &ClientConfig) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_seconds))
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .build()?)
}
