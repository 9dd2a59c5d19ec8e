use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Request parameters, kept sorted by key because the signature is computed
/// over the sorted form.
pub type Params = BTreeMap<String, String>;

/// One row of a tab-separated inventory or listings report, keyed by the
/// normalized header name.
pub type InventoryRow = BTreeMap<String, String>;

/// Processing states reported by the remote service.
pub mod status {
    pub const SUBMITTED: &str = "_SUBMITTED_";
    pub const IN_PROGRESS: &str = "_IN_PROGRESS_";
    pub const DONE: &str = "_DONE_";
    pub const DONE_NO_DATA: &str = "_DONE_NO_DATA_";
    /// Feed submissions spell it with one L.
    pub const FEED_CANCELED: &str = "_CANCELED_";
    pub const REPORT_CANCELLED: &str = "_CANCELLED_";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeedType {
    Product,
    Inventory,
    Override,
    Price,
    ProductImage,
    Relationship,
    OrderAcknowledgment,
    OrderFulfillment,
    OrderAdjustment,
}

impl FeedType {
    pub const ALL: [FeedType; 9] = [
        FeedType::Product,
        FeedType::Inventory,
        FeedType::Override,
        FeedType::Price,
        FeedType::ProductImage,
        FeedType::Relationship,
        FeedType::OrderAcknowledgment,
        FeedType::OrderFulfillment,
        FeedType::OrderAdjustment,
    ];

    /// Name used for the `MessageType` element and the message body element.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Product => "Product",
            FeedType::Inventory => "Inventory",
            FeedType::Override => "Override",
            FeedType::Price => "Price",
            FeedType::ProductImage => "ProductImage",
            FeedType::Relationship => "Relationship",
            FeedType::OrderAcknowledgment => "OrderAcknowledgment",
            FeedType::OrderFulfillment => "OrderFulfillment",
            FeedType::OrderAdjustment => "OrderAdjustment",
        }
    }

    /// Feed type code sent as the `FeedType` parameter of `SubmitFeed`.
    pub fn wire_code(&self) -> &'static str {
        match self {
            FeedType::Product => "_POST_PRODUCT_DATA_",
            FeedType::Inventory => "_POST_INVENTORY_AVAILABILITY_DATA_",
            FeedType::Override => "_POST_PRODUCT_OVERRIDES_DATA_",
            FeedType::Price => "_POST_PRODUCT_PRICING_DATA_",
            FeedType::ProductImage => "_POST_PRODUCT_IMAGE_DATA_",
            FeedType::Relationship => "_POST_PRODUCT_RELATIONSHIP_DATA_",
            FeedType::OrderAcknowledgment => "_POST_ORDER_ACKNOWLEDGEMENT_DATA_",
            FeedType::OrderFulfillment => "_POST_ORDER_FULFILLMENT_DATA_",
            FeedType::OrderAdjustment => "_POST_PAYMENT_ADJUSTMENT_DATA_",
        }
    }
}

impl FromStr for FeedType {
    type Err = MwsError;

    fn from_str(s: &str) -> Result<Self> {
        FeedType::ALL
            .iter()
            .copied()
            .find(|feed_type| feed_type.as_str() == s)
            .ok_or_else(|| MwsError::UnsupportedFeedType(s.to_string()))
    }
}

impl AsRef<str> for FeedType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued feed message. `paths` is already fully qualified
/// (`Message/MessageID`, `Message/OperationType`, `Message/<Type>/...`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub feed_type: FeedType,
    pub sequence_id: u64,
    pub operation_type: String,
    pub paths: Vec<(String, String)>,
}

/// One `<Result>` element of a processing report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub fields: BTreeMap<String, String>,
    pub original: Option<FeedItem>,
}

impl ResultRecord {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|value| value.as_str())
    }

    pub fn message_id(&self) -> Option<u64> {
        self.field("MessageID").and_then(leading_integer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub request_id: String,
    pub report_type: String,
    pub submitted: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub range_start: Option<DateTime<Utc>>,
    pub range_end: Option<DateTime<Utc>>,
    pub status: String,
    pub generated_report_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportInfo {
    pub report_id: String,
    pub report_type: String,
    pub request_id: String,
    pub available: DateTime<Utc>,
}

/// Which column keys an inventory report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBy {
    Sku,
    Asin,
}

impl KeyBy {
    pub fn column(&self) -> &'static str {
        match self {
            KeyBy::Sku => "sku",
            KeyBy::Asin => "asin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub date: Option<DateTime<Utc>>,
    pub fba: bool,
    pub status: String,
    pub ship_service_level: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub asin: String,
    pub sku: String,
    pub title: String,
    pub qty: i64,
    pub price: Decimal,
    pub shipping: Decimal,
    pub handling: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
}

/// Parses the leading optionally-signed integer of `s`, ignoring surrounding
/// whitespace. `"12abc"` yields 12, `"abc"` yields `None`.
pub(crate) fn leading_integer<T: FromStr>(s: &str) -> Option<T> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

#[derive(Debug, thiserror::Error)]
pub enum MwsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported type of data feed: {0}")]
    UnsupportedFeedType(String),

    #[error("Datafeed '{0}' is empty")]
    EmptyFeed(FeedType),

    #[error("Server did not return a feed submission id")]
    NoSubmissionId,

    #[error("Unexpected server response ({status}){}", server_detail(.server_code, .server_message))]
    Transport {
        status: u16,
        server_code: Option<String>,
        server_message: Option<String>,
    },

    #[error("Missing field in server response: {field}")]
    MissingField { field: String },

    #[error("Invalid XML content on line {line}: {message}")]
    XmlParse { line: u64, message: String },

    #[error("Report {report_type} has been canceled")]
    ReportCanceled { report_type: String },

    #[error("Invalid report format: {0}")]
    InvalidReportFormat(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Report parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

fn server_detail(code: &Option<String>, message: &Option<String>) -> String {
    match (code, message) {
        (None, None) => " with undefined error".to_string(),
        (code, message) => format!(
            ": [{}] {}",
            code.as_deref().unwrap_or(""),
            message.as_deref().unwrap_or("")
        ),
    }
}

impl MwsError {
    pub fn missing(field: impl Into<String>) -> Self {
        MwsError::MissingField { field: field.into() }
    }

    /// HTTP status of a transport failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            MwsError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The service asks callers to slow down with 503.
    pub fn is_throttled(&self) -> bool {
        self.status() == Some(503)
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }

    /// Server errors plus failures that never produced a status line.
    pub fn is_transient(&self) -> bool {
        match self {
            MwsError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            other => other.is_server_error(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MwsError>;
