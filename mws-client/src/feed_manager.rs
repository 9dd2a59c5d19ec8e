use crate::config::PollConfig;
use crate::feed_builder::FeedBuilder;
use crate::poll::{CancelGate, PollDelay};
use crate::result_parser::StreamingResultParser;
use crate::store::KeyedDiskStore;
use crate::traits::{RequestBody, Transport};
use crate::types::{FeedItem, FeedType, MwsError, Params, Result, ResultRecord, status};
use crate::xml::{self, XmlElement};
use std::collections::{BTreeMap, HashMap};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info, warn};

pub const OPERATION_UPDATE: &str = "Update";
const DOCUMENT_VERSION: &str = "1.01";
const EOL: &str = "\r\n";

/// Per-client feed queues and the sequence counter shared by all feed types.
#[derive(Debug)]
pub struct FeedState {
    queues: HashMap<FeedType, BTreeMap<u64, FeedItem>>,
    next_sequence: u64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            queues: HashMap::new(),
            next_sequence: 1,
        }
    }
}

/// Processing report of a finished submission.
#[derive(Debug)]
pub struct ProcessingReport {
    pub submission_id: String,
    pub status: String,
    pub results: KeyedDiskStore<ResultRecord>,
}

#[derive(Debug)]
pub enum FeedSubmission {
    /// Submitted without waiting for processing.
    Submitted { submission_id: String },
    Completed(ProcessingReport),
}

impl FeedSubmission {
    pub fn submission_id(&self) -> &str {
        match self {
            FeedSubmission::Submitted { submission_id } => submission_id,
            FeedSubmission::Completed(report) => &report.submission_id,
        }
    }
}

pub struct FeedSubmissionManager<'a, T: Transport> {
    transport: &'a mut T,
    state: &'a mut FeedState,
    poll: &'a PollConfig,
    cancel_gate: &'a mut CancelGate,
    tmp_dir: &'a Path,
    memory_threshold: usize,
}

impl<'a, T: Transport> FeedSubmissionManager<'a, T> {
    pub fn new(
        transport: &'a mut T,
        state: &'a mut FeedState,
        poll: &'a PollConfig,
        cancel_gate: &'a mut CancelGate,
        tmp_dir: &'a Path,
    ) -> Self {
        Self {
            transport,
            state,
            poll,
            cancel_gate,
            tmp_dir,
            memory_threshold: 5 * 1024 * 1024,
        }
    }

    /// Envelopes larger than this are spooled to disk before upload.
    pub fn with_memory_threshold(mut self, bytes: usize) -> Self {
        self.memory_threshold = bytes;
        self
    }

    /// Queues one message of `feed_type`. Paths are relative to the message
    /// body element, e.g. `SKU` or `DescriptionData/Title`.
    pub fn add_item<I, P, V>(&mut self, feed_type: impl AsRef<str>, data: I) -> Result<u64>
    where
        I: IntoIterator<Item = (P, V)>,
        P: AsRef<str>,
        V: AsRef<str>,
    {
        let feed_type: FeedType = feed_type.as_ref().parse()?;
        let sequence_id = self.state.next_sequence;
        self.state.next_sequence += 1;

        let mut paths = vec![
            ("Message/MessageID".to_string(), sequence_id.to_string()),
            ("Message/OperationType".to_string(), OPERATION_UPDATE.to_string()),
        ];
        for (path, value) in data {
            let path = path.as_ref().trim().trim_matches('/');
            paths.push((
                format!("Message/{}/{}", feed_type.as_str(), path),
                value.as_ref().to_string(),
            ));
        }

        self.state.queues.entry(feed_type).or_default().insert(
            sequence_id,
            FeedItem {
                feed_type,
                sequence_id,
                operation_type: OPERATION_UPDATE.to_string(),
                paths,
            },
        );
        debug!("Queued {} item {}", feed_type, sequence_id);
        Ok(sequence_id)
    }

    /// Items waiting in a queue. `None` when the type was never used.
    pub fn queued(&self, feed_type: FeedType) -> Option<&BTreeMap<u64, FeedItem>> {
        self.state.queues.get(&feed_type)
    }

    /// Submits the queue of `feed_type`. The queue is emptied whatever the
    /// outcome. With `wait`, polls until processing ends and returns the
    /// processing report correlated with the submitted items.
    pub async fn submit_feed(&mut self, feed_type: impl AsRef<str>, wait: bool) -> Result<FeedSubmission> {
        let feed_type: FeedType = feed_type.as_ref().parse()?;
        let items = match self.state.queues.get_mut(&feed_type) {
            Some(queue) if !queue.is_empty() => std::mem::take(queue),
            _ => return Err(MwsError::EmptyFeed(feed_type)),
        };

        info!("Submitting {} feed with {} items", feed_type, items.len());
        let envelope = build_envelope(
            feed_type,
            self.transport.merchant_identifier(),
            &items,
            self.memory_threshold,
        )?;

        let mut params = Params::new();
        params.insert("FeedType".to_string(), feed_type.wire_code().to_string());
        let body = self
            .transport
            .call("SubmitFeed", params, Some(Box::new(envelope) as RequestBody))
            .await?;
        let submission_id = xml::read_document(body)?
            .text_at(&["SubmitFeedResult", "FeedSubmissionInfo", "FeedSubmissionId"])
            .ok_or(MwsError::NoSubmissionId)?;
        info!("Feed submission ID is: {}", submission_id);

        if !wait {
            return Ok(FeedSubmission::Submitted { submission_id });
        }

        let status = self.await_submission(&submission_id).await?;
        let mut params = Params::new();
        params.insert("FeedSubmissionId".to_string(), submission_id.clone());
        let report = self
            .transport
            .call("GetFeedSubmissionResult", params, None)
            .await?;
        let results = StreamingResultParser::with_queue(&items).parse(report, self.tmp_dir)?;

        Ok(FeedSubmission::Completed(ProcessingReport {
            submission_id,
            status,
            results,
        }))
    }

    async fn await_submission(&mut self, submission_id: &str) -> Result<String> {
        let mut delay = PollDelay::new(self.poll.feed_status_interval, self.poll.max_backoff);
        loop {
            delay.wait().await;

            let mut params = Params::new();
            params.insert("FeedSubmissionIdList.Id.1".to_string(), submission_id.to_string());
            let body = match self.transport.call("GetFeedSubmissionList", params, None).await {
                Ok(body) => {
                    delay.reset();
                    body
                }
                Err(e) if e.is_throttled() => {
                    warn!("Submission status error: {}", e);
                    let next = delay.escalate();
                    debug!("Increasing delay up to {:?}", next);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let document = xml::read_document(body)?;
            let current = document
                .text_at(&[
                    "GetFeedSubmissionListResult",
                    "FeedSubmissionInfo",
                    "FeedProcessingStatus",
                ])
                .ok_or_else(|| MwsError::missing("FeedProcessingStatus"))?;
            info!("Current status of submission is: {}", current);

            if current == status::DONE || current == status::FEED_CANCELED {
                return Ok(current);
            }
        }
    }

    /// Processing status of each submission id. With `wait`, server errors
    /// are retried with a doubling delay.
    pub async fn submission_statuses(&mut self, ids: &[&str], wait: bool) -> Result<BTreeMap<String, String>> {
        let mut params = Params::new();
        for (i, id) in ids.iter().enumerate() {
            params.insert(format!("FeedSubmissionIdList.Id.{}", i + 1), id.to_string());
        }

        let mut delay = PollDelay::new(self.poll.status_retry_interval, self.poll.max_backoff);
        let body = loop {
            match self.transport.call("GetFeedSubmissionList", params.clone(), None).await {
                Ok(body) => break body,
                Err(e) if wait && e.is_server_error() => {
                    warn!("Submission status error: {}", e);
                    delay.wait().await;
                    let next = delay.escalate();
                    debug!("Increasing delay up to {:?}", next);
                }
                Err(e) => return Err(e),
            }
        };

        let document = xml::read_document(body)?;
        Ok(submission_infos(&document, "GetFeedSubmissionListResult"))
    }

    /// Status of a single submission, `None` when the service does not know it.
    pub async fn submission_status(&mut self, id: &str, wait: bool) -> Result<Option<String>> {
        let mut statuses = self.submission_statuses(&[id], wait).await?;
        Ok(statuses.remove(id))
    }

    /// Cancels submissions, keeping cancel calls at least a window apart.
    pub async fn cancel_submissions(&mut self, ids: &[&str]) -> Result<BTreeMap<String, String>> {
        self.cancel_gate.wait(self.poll.cancel_window).await;

        let mut params = Params::new();
        for (i, id) in ids.iter().enumerate() {
            params.insert(format!("FeedSubmissionIdList.Id.{}", i + 1), id.to_string());
        }
        let body = self.transport.call("CancelFeedSubmissions", params, None).await?;
        self.cancel_gate.mark();
        let document = xml::read_document(body)?;
        Ok(submission_infos(&document, "CancelFeedSubmissionsResult"))
    }

    /// Processing report of an earlier submission, without correlation.
    pub async fn submission_result(&mut self, id: &str) -> Result<KeyedDiskStore<ResultRecord>> {
        let mut params = Params::new();
        params.insert("FeedSubmissionId".to_string(), id.to_string());

        let mut delay = PollDelay::new(self.poll.result_retry_interval, self.poll.max_backoff);
        let body = loop {
            match self.transport.call("GetFeedSubmissionResult", params.clone(), None).await {
                Ok(body) => break body,
                Err(e) if e.is_server_error() => {
                    warn!("{}", e);
                    delay.wait().await;
                    let next = delay.escalate();
                    debug!("Increasing delay up to {:?}", next);
                }
                Err(e) => return Err(e),
            }
        };
        StreamingResultParser::new().parse(body, self.tmp_dir)
    }
}

fn submission_infos(document: &XmlElement, result_element: &str) -> BTreeMap<String, String> {
    document
        .find_all(&[result_element, "FeedSubmissionInfo"])
        .into_iter()
        .filter_map(|info| {
            let id = info.text_at(&["FeedSubmissionId"])?;
            let status = info.text_at(&["FeedProcessingStatus"]).unwrap_or_default();
            Some((id, status))
        })
        .collect()
}

/// Writes the feed envelope for `items` into a spooled buffer, rewound.
pub fn build_envelope(
    feed_type: FeedType,
    merchant_identifier: &str,
    items: &BTreeMap<u64, FeedItem>,
    memory_threshold: usize,
) -> Result<tempfile::SpooledTempFile> {
    let mut out = tempfile::SpooledTempFile::new(memory_threshold);
    write!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>{EOL}")?;
    write!(
        out,
        "<AmazonEnvelope xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xsi:noNamespaceSchemaLocation=\"amzn-envelope.xsd\">{EOL}"
    )?;
    write!(
        out,
        "<Header><DocumentVersion>{DOCUMENT_VERSION}</DocumentVersion>\
         <MerchantIdentifier>{}</MerchantIdentifier></Header>{EOL}",
        quick_xml::escape::escape(merchant_identifier)
    )?;
    write!(out, "<MessageType>{}</MessageType>{EOL}", feed_type.as_str())?;
    for item in items.values() {
        let fragment = FeedBuilder::from_pairs(item.paths.iter().map(|(p, v)| (p, v))).build();
        write!(out, "{}{EOL}", fragment)?;
    }
    write!(out, "</AmazonEnvelope>{EOL}")?;
    out.seek(SeekFrom::Start(0))?;
    Ok(out)
}
