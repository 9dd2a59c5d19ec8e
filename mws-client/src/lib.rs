pub mod client;
pub mod config;
pub mod feed_builder;
pub mod feed_manager;
pub mod observability;
pub mod offers;
pub mod poll;
pub mod report_format;
pub mod report_manager;
pub mod result_parser;
pub mod signing;
pub mod store;
pub mod traits;
pub mod transport;
pub mod types;
pub mod xml;

pub use client::MwsClient;
pub use config::{ClientConfig, PollConfig};
pub use feed_builder::FeedBuilder;
pub use feed_manager::{FeedSubmission, FeedSubmissionManager, ProcessingReport};
pub use report_manager::{InventoryReport, ReportData, ReportKind, ReportManager, RequestFilter};
pub use result_parser::StreamingResultParser;
pub use store::KeyedDiskStore;
pub use traits::{RequestBody, Transport};
pub use transport::{ResponseBody, TransportClient, TransportStats};
pub use types::*;
