use crate::types::{MwsError, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const MARKETPLACE_US: &str = "ATVPDKIKX0DER";
pub const MARKETPLACE_CA: &str = "A2EUQ1WTGCTBG2";
pub const MARKETPLACE_JP: &str = "A1VC38T7YXB528";

/// Marketplace id to service host. The first entry is the fallback.
pub const LOCALES: [(&str, &str); 3] = [
    (MARKETPLACE_US, "mws.amazonservices.com"),
    (MARKETPLACE_CA, "mws.amazonservices.ca"),
    (MARKETPLACE_JP, "mws.amazonservices.jp"),
];

pub const DEFAULT_USER_AGENT: &str = "mws-client/0.1 (Language=Rust)";

pub fn host_for(marketplace_id: &str) -> Option<&'static str> {
    let wanted = marketplace_id.trim().to_uppercase();
    LOCALES
        .iter()
        .find(|(id, _)| *id == wanted)
        .map(|(_, host)| *host)
}

/// Every wait and backoff constant used by the feed and report state machines.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between feed submission status polls.
    pub feed_status_interval: Duration,
    /// First retry delay of batch status queries.
    pub status_retry_interval: Duration,
    /// First retry delay when fetching a processing report.
    pub result_retry_interval: Duration,
    /// Delay between report request status polls.
    pub report_status_interval: Duration,
    /// First retry delay of a throttled report download.
    pub download_retry_interval: Duration,
    /// First retry delay of report request listings.
    pub list_retry_interval: Duration,
    /// Minimal spacing between two cancel calls.
    pub cancel_window: Duration,
    /// Finished reports younger than this are reused.
    pub reuse_window: Duration,
    pub fba_reuse_window: Duration,
    /// In-flight requests older than this are not watched.
    pub in_flight_max_age: Duration,
    /// How far back the inbound inventory fallback searches.
    pub fallback_lookback: Duration,
    /// Upper bound for any doubled delay.
    pub max_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            feed_status_interval: Duration::from_secs(30),
            status_retry_interval: Duration::from_secs(45),
            result_retry_interval: Duration::from_secs(30),
            report_status_interval: Duration::from_secs(45),
            download_retry_interval: Duration::from_secs(60),
            list_retry_interval: Duration::from_secs(10),
            cancel_window: Duration::from_secs(45),
            reuse_window: Duration::from_secs(15),
            fba_reuse_window: Duration::from_secs(30),
            in_flight_max_age: Duration::from_secs(6 * 3600),
            fallback_lookback: Duration::from_secs(24 * 3600),
            max_backoff: Duration::from_secs(3600),
        }
    }
}

#[derive(Clone)]
pub struct ClientConfig {
    pub merchant_id: String,
    pub marketplace_id: String,
    pub access_key_id: String,
    pub secret_key: String,
    pub auth_token: Option<String>,
    /// Replaces the locale host, e.g. for a sandbox.
    pub endpoint: Option<Url>,
    pub tmp_dir: PathBuf,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub post_timeout_seconds: u64,
    /// Responses larger than this spill to disk.
    pub memory_threshold: usize,
    pub poll: PollConfig,
}

impl ClientConfig {
    pub fn new(
        merchant_id: impl Into<String>,
        marketplace_id: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            marketplace_id: marketplace_id.into(),
            access_key_id: access_key_id.into(),
            secret_key: secret_key.into(),
            auth_token: None,
            endpoint: None,
            tmp_dir: env::temp_dir(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_seconds: 300,
            post_timeout_seconds: 30,
            memory_threshold: 5 * 1024 * 1024,
            poll: PollConfig::default(),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.auth_token = if token.trim().is_empty() { None } else { Some(token) };
        self
    }

    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = dir.into();
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Loads credentials from `MWS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| -> Result<String> {
            env::var(name).map_err(|_| MwsError::Config(format!("{} is not set", name)))
        };

        let mut config = Self::new(
            required("MWS_MERCHANT_ID")?,
            required("MWS_MARKETPLACE_ID")?,
            required("MWS_ACCESS_KEY_ID")?,
            required("MWS_SECRET_KEY")?,
        );
        if let Ok(token) = env::var("MWS_AUTH_TOKEN") {
            config = config.with_auth_token(token);
        }
        if let Ok(dir) = env::var("MWS_TMP_DIR") {
            config.tmp_dir = PathBuf::from(dir);
        }
        if let Ok(endpoint) = env::var("MWS_ENDPOINT") {
            config.endpoint = Some(Url::parse(&endpoint)?);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mandatory = [
            ("merchant id", &self.merchant_id),
            ("marketplace id", &self.marketplace_id),
            ("access key id", &self.access_key_id),
            ("secret key", &self.secret_key),
        ];
        for (name, value) in mandatory {
            if value.trim().is_empty() {
                return Err(MwsError::Config(format!("Empty {}", name)));
            }
        }
        if !self.tmp_dir.is_dir() {
            return Err(MwsError::Config(format!(
                "Temporary directory {} does not exist",
                self.tmp_dir.display()
            )));
        }
        Ok(())
    }

    /// Service root for a marketplace. Unknown ids fall back to the first locale.
    pub fn endpoint_for(&self, marketplace_id: &str) -> Result<Url> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }
        let host = host_for(marketplace_id).unwrap_or(LOCALES[0].1);
        Ok(Url::parse(&format!("https://{}/", host))?)
    }

    /// Identifier written into feed envelope headers.
    pub fn merchant_identifier(&self) -> &str {
        self.auth_token.as_deref().unwrap_or(&self.merchant_id)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("merchant_id", &self.merchant_id)
            .field("marketplace_id", &self.marketplace_id)
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"<redacted>")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("tmp_dir", &self.tmp_dir)
            .field("user_agent", &self.user_agent)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("post_timeout_seconds", &self.post_timeout_seconds)
            .field("memory_threshold", &self.memory_threshold)
            .field("poll", &self.poll)
            .finish()
    }
}
