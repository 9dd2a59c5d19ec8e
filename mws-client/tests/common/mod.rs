// Shared helpers for the integration tests. Not every test binary uses all of them.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mws_client::{MwsError, Params, PollConfig, RequestBody, ResponseBody, Result, Transport};
use std::collections::VecDeque;
use std::io::Read;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Fixed "service time" used by the scripted transport.
pub fn service_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub action: String,
    pub params: Params,
    pub body: Option<String>,
}

enum Scripted {
    Body(String),
    Status(u16),
}

/// Transport that answers from a script, in order, and records every call.
pub struct ScriptedTransport {
    script: VecDeque<(String, Scripted)>,
    pub calls: Vec<RecordedCall>,
    pub auth_token: Option<String>,
    pub now: DateTime<Utc>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            calls: Vec::new(),
            auth_token: None,
            now: service_now(),
        }
    }

    pub fn respond(mut self, action: &str, body: &str) -> Self {
        self.script.push_back((action.to_string(), Scripted::Body(body.to_string())));
        self
    }

    pub fn fail(mut self, action: &str, status: u16) -> Self {
        self.script.push_back((action.to_string(), Scripted::Status(status)));
        self
    }

    pub fn calls_to(&self, action: &str) -> Vec<&RecordedCall> {
        self.calls.iter().filter(|call| call.action == action).collect()
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&mut self, action: &str, params: Params, body: Option<RequestBody>) -> Result<ResponseBody> {
        let body = body.map(|mut reader| {
            let mut text = String::new();
            reader.read_to_string(&mut text).unwrap();
            text
        });
        self.calls.push(RecordedCall {
            action: action.to_string(),
            params,
            body,
        });

        let (expected, answer) = self
            .script
            .pop_front()
            .unwrap_or_else(|| panic!("Unscripted call to {}", action));
        assert_eq!(expected, action, "Calls out of script order");

        match answer {
            Scripted::Body(text) => Ok(ResponseBody::from_bytes(text)),
            Scripted::Status(status) => Err(MwsError::Transport {
                status,
                server_code: Some("RequestThrottled".to_string()),
                server_message: Some("Request is throttled".to_string()),
            }),
        }
    }

    fn marketplace_id(&self) -> &str {
        "ATVPDKIKX0DER"
    }

    fn merchant_id(&self) -> &str {
        "M_TEST_1"
    }

    fn merchant_identifier(&self) -> &str {
        self.auth_token.as_deref().unwrap_or("M_TEST_1")
    }

    fn server_now(&self) -> DateTime<Utc> {
        self.now
    }
}

pub fn poll_config() -> PollConfig {
    PollConfig::default()
}

pub fn submit_feed_response(id: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<SubmitFeedResponse xmlns="http://mws.amazonaws.com/doc/2009-01-01/">
  <SubmitFeedResult>
    <FeedSubmissionInfo>
      <FeedSubmissionId>{id}</FeedSubmissionId>
      <FeedType>_POST_PRODUCT_DATA_</FeedType>
      <FeedProcessingStatus>_SUBMITTED_</FeedProcessingStatus>
    </FeedSubmissionInfo>
  </SubmitFeedResult>
</SubmitFeedResponse>"#
    )
}

pub fn feed_status_response(entries: &[(&str, &str)]) -> String {
    let infos: String = entries
        .iter()
        .map(|(id, status)| {
            format!(
                "<FeedSubmissionInfo><FeedSubmissionId>{id}</FeedSubmissionId>\
                 <FeedProcessingStatus>{status}</FeedProcessingStatus></FeedSubmissionInfo>"
            )
        })
        .collect();
    format!(
        r#"<GetFeedSubmissionListResponse xmlns="http://mws.amazonaws.com/doc/2009-01-01/">
<GetFeedSubmissionListResult>{infos}</GetFeedSubmissionListResult>
</GetFeedSubmissionListResponse>"#
    )
}

pub fn processing_report(results: &[(u64, &str, &str)]) -> String {
    let results: String = results
        .iter()
        .map(|(message_id, code, description)| {
            format!(
                "<Result><MessageID>{message_id}</MessageID><ResultCode>{code}</ResultCode>\
                 <ResultMessageCode>8560</ResultMessageCode>\
                 <ResultDescription>{description}</ResultDescription>\
                 <AdditionalInfo><SKU>SKU-{message_id}</SKU></AdditionalInfo></Result>"
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<AmazonEnvelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="amzn-envelope.xsd">
<Header><DocumentVersion>1.02</DocumentVersion><MerchantIdentifier>M_TEST_1</MerchantIdentifier></Header>
<MessageType>ProcessingReport</MessageType>
<Message><MessageID>1</MessageID><ProcessingReport>
<DocumentTransactionID>4242</DocumentTransactionID>
<StatusCode>Complete</StatusCode>
<ProcessingSummary><MessagesProcessed>2</MessagesProcessed></ProcessingSummary>
{results}
</ProcessingReport></Message>
</AmazonEnvelope>"#
    )
}

/// One `ReportRequestInfo` entry.
pub struct RequestInfo<'a> {
    pub id: &'a str,
    pub report_type: &'a str,
    pub status: &'a str,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub report_id: Option<&'a str>,
}

impl RequestInfo<'_> {
    fn to_xml(&self) -> String {
        let mut xml = format!(
            "<ReportRequestInfo><ReportRequestId>{}</ReportRequestId><ReportType>{}</ReportType>\
             <SubmittedDate>2024-03-01T11:00:00+00:00</SubmittedDate>\
             <ReportProcessingStatus>{}</ReportProcessingStatus>",
            self.id, self.report_type, self.status
        );
        if let Some(started) = self.started {
            xml.push_str(&format!("<StartedProcessingDate>{}</StartedProcessingDate>", started.to_rfc3339()));
        }
        if let Some(completed) = self.completed {
            xml.push_str(&format!("<CompletedDate>{}</CompletedDate>", completed.to_rfc3339()));
        }
        if let Some(report_id) = self.report_id {
            xml.push_str(&format!("<GeneratedReportId>{}</GeneratedReportId>", report_id));
        }
        xml.push_str("</ReportRequestInfo>");
        xml
    }
}

pub fn request_list_response(infos: &[RequestInfo<'_>]) -> String {
    let infos: String = infos.iter().map(RequestInfo::to_xml).collect();
    format!(
        r#"<GetReportRequestListResponse xmlns="http://mws.amazonaws.com/doc/2009-01-01/">
<GetReportRequestListResult><NextToken/><HasNext>false</HasNext>{infos}</GetReportRequestListResult>
</GetReportRequestListResponse>"#
    )
}

pub fn status_response(id: &str, report_type: &str, status: &str, report_id: Option<&str>) -> String {
    request_list_response(&[RequestInfo {
        id,
        report_type,
        status,
        started: None,
        completed: None,
        report_id,
    }])
}

pub fn request_report_response(id: &str) -> String {
    format!(
        r#"<RequestReportResponse xmlns="http://mws.amazonaws.com/doc/2009-01-01/">
<RequestReportResult><ReportRequestInfo><ReportRequestId>{id}</ReportRequestId>
<ReportProcessingStatus>_SUBMITTED_</ReportProcessingStatus></ReportRequestInfo></RequestReportResult>
</RequestReportResponse>"#
    )
}

pub fn report_list_response(entries: &[(&str, &str, &str, &str)]) -> String {
    let infos: String = entries
        .iter()
        .map(|(report_id, report_type, request_id, available)| {
            format!(
                "<ReportInfo><ReportId>{report_id}</ReportId><ReportType>{report_type}</ReportType>\
                 <ReportRequestId>{request_id}</ReportRequestId><AvailableDate>{available}</AvailableDate>\
                 <Acknowledged>false</Acknowledged></ReportInfo>"
            )
        })
        .collect();
    format!(
        r#"<GetReportListResponse xmlns="http://mws.amazonaws.com/doc/2009-01-01/">
<GetReportListResult>{infos}</GetReportListResult>
</GetReportListResponse>"#
    )
}
