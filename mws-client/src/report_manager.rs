//! Report jobs: reuse or request, poll until finished, download and fold the
//! tab-separated payload.

use crate::config::PollConfig;
use crate::poll::{CancelGate, PollDelay};
use crate::report_format;
use crate::signing::format_timestamp;
use crate::store::KeyedDiskStore;
use crate::traits::Transport;
use crate::transport::ResponseBody;
use crate::types::{
    InventoryRow, KeyBy, MwsError, Order, Params, ReportInfo, ReportRequest, Result, status,
};
use crate::xml::{self, XmlElement};
use chrono::{DateTime, TimeDelta, Utc};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest date range one order report may cover.
pub const ORDER_WINDOW_SECONDS: i64 = 30 * 24 * 60 * 60 - 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    OpenListings,
    FbaInventory,
    Orders,
    MerchantListings,
}

impl ReportKind {
    pub fn report_type(&self) -> &'static str {
        match self {
            ReportKind::OpenListings => "_GET_FLAT_FILE_OPEN_LISTINGS_DATA_",
            ReportKind::FbaInventory => "_GET_FBA_MYI_UNSUPPRESSED_INVENTORY_DATA_",
            ReportKind::Orders => "_GET_FLAT_FILE_ALL_ORDERS_DATA_BY_ORDER_DATE_",
            ReportKind::MerchantListings => "_GET_MERCHANT_LISTINGS_DATA_",
        }
    }

    /// How old a finished report may be and still be reused. Order reports
    /// are never reused since each one covers its own date range.
    fn reuse_window(&self, poll: &PollConfig) -> Option<Duration> {
        match self {
            ReportKind::OpenListings | ReportKind::MerchantListings => Some(poll.reuse_window),
            ReportKind::FbaInventory => Some(poll.fba_reuse_window),
            ReportKind::Orders => None,
        }
    }

    fn falls_back_on_cancel(&self) -> bool {
        matches!(self, ReportKind::FbaInventory)
    }
}

/// Which requests `request_list` asks for.
#[derive(Debug, Clone)]
pub enum RequestFilter {
    /// The 100 most recent requests.
    All,
    Ids(Vec<String>),
    Type(String),
}

#[derive(Debug)]
pub struct DownloadedReport {
    pub request_id: Option<String>,
    pub report_id: String,
    pub body: ResponseBody,
    /// Set when a canceled request was replaced by an older finished report.
    pub stale_fallback: bool,
}

#[derive(Debug)]
pub enum ReportData {
    Ready(DownloadedReport),
    /// The job finished without data.
    NoData,
}

#[derive(Debug)]
pub struct InventoryReport {
    pub rows: KeyedDiskStore<InventoryRow>,
    pub stale_fallback: bool,
}

#[derive(Debug, Default)]
pub struct ListingsExport {
    pub header: Vec<String>,
    pub rows: Vec<InventoryRow>,
}

enum Reusable {
    InFlight { request_id: String },
    Finished { request_id: String, report_id: String },
}

/// Terminal state of a report request.
struct Outcome {
    status: String,
    generated_report_id: Option<String>,
}

pub struct ReportManager<'a, T: Transport> {
    transport: &'a mut T,
    poll: &'a PollConfig,
    cancel_gate: &'a mut CancelGate,
    tmp_dir: &'a Path,
}

impl<'a, T: Transport> ReportManager<'a, T> {
    pub fn new(
        transport: &'a mut T,
        poll: &'a PollConfig,
        cancel_gate: &'a mut CancelGate,
        tmp_dir: &'a Path,
    ) -> Self {
        Self { transport, poll, cancel_gate, tmp_dir }
    }

    /// Open listings inventory keyed by sku or asin.
    pub async fn inventory(&mut self, key_by: KeyBy) -> Result<InventoryReport> {
        self.inventory_of(ReportKind::OpenListings, key_by).await
    }

    /// FBA inventory keyed by sku or asin.
    pub async fn inbound(&mut self, key_by: KeyBy) -> Result<InventoryReport> {
        self.inventory_of(ReportKind::FbaInventory, key_by).await
    }

    async fn inventory_of(&mut self, kind: ReportKind, key_by: KeyBy) -> Result<InventoryReport> {
        let mut rows = KeyedDiskStore::temporary_in(self.tmp_dir)?;
        let mut stale_fallback = false;
        match self.fetch_report(kind, None).await? {
            ReportData::Ready(report) => {
                stale_fallback = report.stale_fallback;
                let count = report_format::fold_inventory(report.body, key_by, &mut rows)?;
                info!("Loaded {} rows of report {}", count, report.report_id);
            }
            ReportData::NoData => debug!("{} has no data", kind.report_type()),
        }
        Ok(InventoryReport { rows, stale_fallback })
    }

    /// Orders placed between `from` (default: a day ago) and `to` (default:
    /// now), requested in windows of just under 30 days.
    pub async fn orders(
        &mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<KeyedDiskStore<Order>> {
        let now = self.transport.server_now();
        let to = to.unwrap_or(now);
        let mut from = from.unwrap_or(now - TimeDelta::days(1));
        let window = TimeDelta::seconds(ORDER_WINDOW_SECONDS);
        let mut orders = KeyedDiskStore::temporary_in(self.tmp_dir)?;

        // An empty or inverted range requests nothing.
        while from < to {
            let end = (from + window).min(to);
            debug!("Requesting orders from {} to {}", from, end);
            if let ReportData::Ready(report) = self.fetch_report(ReportKind::Orders, Some((from, end))).await? {
                // Windows share their boundary, so a later window's copy of an
                // order replaces the earlier one.
                let mut window_orders = KeyedDiskStore::temporary_in(self.tmp_dir)?;
                report_format::fold_orders(report.body, &mut window_orders)?;
                for entry in window_orders.iter() {
                    let (id, order) = entry?;
                    orders.set(&id, &order)?;
                }
            }
            from = end;
        }
        info!("Loaded {} orders", orders.len());
        Ok(orders)
    }

    /// Rows of every merchant listings report on record, minus those fulfilled
    /// through `exclude_channel`.
    pub async fn merchant_listings(&mut self, exclude_channel: Option<&str>) -> Result<ListingsExport> {
        let report_type = ReportKind::MerchantListings.report_type();
        let requests = self.request_list(RequestFilter::Type(report_type.to_string())).await?;
        let mut export = ListingsExport::default();

        for request in requests {
            let Some(report_id) = request.generated_report_id else {
                continue;
            };
            debug!("Reading listings report {}", report_id);
            let body = self.download_report(&report_id).await?;
            let rows = &mut export.rows;
            let header = report_format::for_each_row(body, &[], |row| {
                let channel = row.get("fulfillment-channel").map(String::as_str);
                if exclude_channel.is_none() || channel != exclude_channel {
                    rows.push(row);
                }
                Ok(())
            })?;
            for name in header {
                if !export.header.contains(&name) {
                    export.header.push(name);
                }
            }
        }
        Ok(export)
    }

    /// Runs one report job to completion and downloads the result.
    pub async fn fetch_report(
        &mut self,
        kind: ReportKind,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<ReportData> {
        let report_type = kind.report_type();
        let reusable = match kind.reuse_window(self.poll) {
            Some(window) => self.find_reusable(report_type, window).await,
            None => None,
        };

        let (request_id, report_id, stale_fallback) = match reusable {
            Some(Reusable::Finished { request_id, report_id }) => (request_id, report_id, false),
            other => {
                let request_id = match other {
                    Some(Reusable::InFlight { request_id }) => request_id,
                    _ => self.request_report(report_type, range).await?,
                };
                info!("Report request ID is: {}", request_id);

                let outcome = self.await_request(&request_id).await?;
                match outcome.status.as_str() {
                    status::DONE_NO_DATA => {
                        debug!("There is no data in the report");
                        return Ok(ReportData::NoData);
                    }
                    status::REPORT_CANCELLED if kind.falls_back_on_cancel() => {
                        debug!("{} has been canceled, looking for the latest finished one", report_type);
                        let Some(latest) = self.latest_finished(report_type).await else {
                            return Ok(ReportData::NoData);
                        };
                        warn!(
                            "Reusing finished request {} instead of canceled {}; data may be stale",
                            latest.request_id, request_id
                        );
                        let report_id = match latest.generated_report_id {
                            Some(id) => id,
                            None => self.resolve_report_id(&latest.request_id).await?,
                        };
                        (latest.request_id, report_id, true)
                    }
                    status::REPORT_CANCELLED => {
                        return Err(MwsError::ReportCanceled { report_type: report_type.to_string() });
                    }
                    _ => {
                        let report_id = match outcome.generated_report_id {
                            Some(id) => id,
                            None => self.resolve_report_id(&request_id).await?,
                        };
                        (request_id, report_id, false)
                    }
                }
            }
        };

        debug!("Report ID is: {}", report_id);
        let body = self.download_with_retry(&report_id).await?;
        Ok(ReportData::Ready(DownloadedReport {
            request_id: Some(request_id),
            report_id,
            body,
            stale_fallback,
        }))
    }

    /// Existing request worth reusing. Lookup failures only cost the reuse.
    async fn find_reusable(&mut self, report_type: &str, window: Duration) -> Option<Reusable> {
        let requests = match self.request_list(RequestFilter::Type(report_type.to_string())).await {
            Ok(requests) => requests,
            Err(e) => {
                warn!("Unable to check existing reports: {}", e);
                return None;
            }
        };

        let now = self.transport.server_now();
        let max_age = TimeDelta::from_std(self.poll.in_flight_max_age).unwrap_or(TimeDelta::days(36500));
        let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::zero());

        for request in requests {
            match request.status.as_str() {
                status::SUBMITTED | status::IN_PROGRESS => {
                    if request.started.is_some_and(|started| now - started > max_age) {
                        continue;
                    }
                    info!("Request is in progress. Attaching watcher to request: {}", request.request_id);
                    return Some(Reusable::InFlight { request_id: request.request_id });
                }
                status::DONE => {
                    let finished = request.completed.or(request.started);
                    let fresh = finished.is_some_and(|at| now - at <= window);
                    if let (true, Some(report_id)) = (fresh, request.generated_report_id) {
                        info!(
                            "Request just was done. Reusing data: request = {}; report = {}",
                            request.request_id, report_id
                        );
                        return Some(Reusable::Finished { request_id: request.request_id, report_id });
                    }
                }
                _ => {}
            }
        }
        None
    }

    async fn request_report(
        &mut self,
        report_type: &str,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<String> {
        debug!("Requesting report {}", report_type);
        let mut params = Params::new();
        params.insert("ReportType".to_string(), report_type.to_string());
        params.insert(
            "MarketplaceIdList.Id.1".to_string(),
            self.transport.marketplace_id().to_string(),
        );
        if let Some((start, end)) = range {
            params.insert("StartDate".to_string(), format_timestamp(start));
            params.insert("EndDate".to_string(), format_timestamp(end));
        }

        let body = self.transport.call("RequestReport", params, None).await?;
        xml::read_document(body)?
            .text_at(&["RequestReportResult", "ReportRequestInfo", "ReportRequestId"])
            .ok_or_else(|| MwsError::missing("ReportRequestId"))
    }

    async fn await_request(&mut self, request_id: &str) -> Result<Outcome> {
        let mut delay = PollDelay::new(self.poll.report_status_interval, self.poll.max_backoff);
        loop {
            delay.wait().await;

            let mut params = Params::new();
            params.insert("ReportRequestIdList.Id.1".to_string(), request_id.to_string());
            let body = match self.transport.call("GetReportRequestList", params, None).await {
                Ok(body) => {
                    delay.reset();
                    body
                }
                Err(e) if e.is_throttled() => {
                    warn!("Report status error: {}", e);
                    let next = delay.escalate();
                    debug!("Increasing delay up to {:?}", next);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let document = xml::read_document(body)?;
            let info = document
                .find(&["GetReportRequestListResult", "ReportRequestInfo"])
                .ok_or_else(|| MwsError::missing("ReportRequestInfo"))?;
            let current = info
                .text_at(&["ReportProcessingStatus"])
                .ok_or_else(|| MwsError::missing("ReportProcessingStatus"))?
                .to_uppercase();
            info!("Current status of request is: {}", current);

            if matches!(
                current.as_str(),
                status::REPORT_CANCELLED | status::DONE | status::DONE_NO_DATA
            ) {
                return Ok(Outcome {
                    status: current,
                    generated_report_id: info.text_at(&["GeneratedReportId"]),
                });
            }
        }
    }

    /// Most recent finished request of `report_type` within the lookback.
    async fn latest_finished(&mut self, report_type: &str) -> Option<ReportRequest> {
        let since = self.transport.server_now()
            - TimeDelta::from_std(self.poll.fallback_lookback).unwrap_or(TimeDelta::days(1));
        loop {
            let mut params = Params::new();
            params.insert("ReportTypeList.Type.1".to_string(), report_type.to_string());
            params.insert("ReportProcessingStatusList.Status.1".to_string(), status::DONE.to_string());
            params.insert("MaxCount".to_string(), "1".to_string());
            params.insert("RequestedFromDate".to_string(), format_timestamp(since));

            let found = match self.transport.call("GetReportRequestList", params, None).await {
                Ok(body) => parse_request_list(body, "GetReportRequestListResult"),
                Err(e) if e.is_server_error() => {
                    warn!("Fallback lookup failed: {}", e);
                    tokio::time::sleep(self.poll.report_status_interval).await;
                    continue;
                }
                Err(e) => Err(e),
            };
            return match found {
                Ok(requests) => {
                    let latest = requests.into_iter().next();
                    if latest.is_none() {
                        warn!("There is no valid latest report to reuse");
                    }
                    latest
                }
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            };
        }
    }

    async fn resolve_report_id(&mut self, request_id: &str) -> Result<String> {
        debug!("Requesting report ID by request ID: {}", request_id);
        let mut params = Params::new();
        params.insert("ReportRequestIdList.Id.1".to_string(), request_id.to_string());
        let body = self.transport.call("GetReportList", params, None).await?;
        xml::read_document(body)?
            .text_at(&["GetReportListResult", "ReportInfo", "ReportId"])
            .ok_or_else(|| MwsError::missing("ReportId"))
    }

    async fn download_with_retry(&mut self, report_id: &str) -> Result<ResponseBody> {
        let mut delay = PollDelay::new(self.poll.download_retry_interval, self.poll.max_backoff);
        loop {
            match self.download_report(report_id).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_throttled() => {
                    warn!("Report download error: {}", e);
                    delay.wait().await;
                    let next = delay.escalate();
                    debug!("Increasing delay up to {:?}", next);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Downloads a generated report, rewound and ready to read.
    pub async fn download_report(&mut self, report_id: &str) -> Result<ResponseBody> {
        let mut params = Params::new();
        params.insert("ReportId".to_string(), report_id.to_string());
        let mut body = self.transport.call("GetReport", params, None).await?;
        body.rewind()?;
        Ok(body)
    }

    /// Report requests on record, retrying server and connection failures.
    pub async fn request_list(&mut self, filter: RequestFilter) -> Result<Vec<ReportRequest>> {
        let mut params = Params::new();
        match &filter {
            RequestFilter::All => {
                params.insert("MaxCount".to_string(), "100".to_string());
            }
            RequestFilter::Ids(ids) => {
                for (i, id) in ids.iter().enumerate() {
                    params.insert(format!("ReportRequestIdList.Id.{}", i + 1), id.clone());
                }
            }
            RequestFilter::Type(report_type) => {
                params.insert("ReportTypeList.Type.1".to_string(), report_type.clone());
            }
        }

        let mut delay = PollDelay::new(self.poll.list_retry_interval, self.poll.max_backoff);
        let body = loop {
            match self.transport.call("GetReportRequestList", params.clone(), None).await {
                Ok(body) => break body,
                Err(e) if e.is_transient() => {
                    delay.wait().await;
                    let next = delay.escalate();
                    warn!("Report status error: {}", e);
                    debug!("Increasing delay up to {:?}", next);
                }
                Err(e) => return Err(e),
            }
        };
        parse_request_list(body, "GetReportRequestListResult")
    }

    /// Generated reports, newest first as the service returns them.
    pub async fn report_list(&mut self, report_type: Option<&str>, limit: u32) -> Result<Vec<ReportInfo>> {
        let mut params = Params::new();
        params.insert("MaxCount".to_string(), limit.to_string());
        if let Some(report_type) = report_type {
            params.insert("ReportTypeList.Type.1".to_string(), report_type.to_string());
        }
        let body = self.transport.call("GetReportList", params, None).await?;
        let document = xml::read_document(body)?;

        Ok(document
            .find_all(&["GetReportListResult", "ReportInfo"])
            .into_iter()
            .filter_map(|info| {
                let available = parse_date(info.text_at(&["AvailableDate"]))?;
                Some(ReportInfo {
                    report_id: info.text_at(&["ReportId"]).unwrap_or_default(),
                    report_type: info.text_at(&["ReportType"]).unwrap_or_default(),
                    request_id: info.text_at(&["ReportRequestId"]).unwrap_or_default(),
                    available,
                })
            })
            .collect())
    }

    /// Cancels report requests. Shares the cancel spacing with feed cancels.
    pub async fn cancel_report_requests(&mut self, ids: &[&str]) -> Result<Vec<ReportRequest>> {
        self.cancel_gate.wait(self.poll.cancel_window).await;
        let mut params = Params::new();
        for (i, id) in ids.iter().enumerate() {
            params.insert(format!("ReportRequestIdList.Id.{}", i + 1), id.to_string());
        }
        let body = self.transport.call("CancelReportRequests", params, None).await?;
        self.cancel_gate.mark();
        parse_request_list(body, "CancelReportRequestsResult")
    }
}

fn parse_request_list(body: ResponseBody, result_element: &str) -> Result<Vec<ReportRequest>> {
    let document = xml::read_document(body)?;
    Ok(document
        .find_all(&[result_element, "ReportRequestInfo"])
        .into_iter()
        .map(request_from)
        .collect())
}

fn request_from(info: &XmlElement) -> ReportRequest {
    ReportRequest {
        request_id: info.text_at(&["ReportRequestId"]).unwrap_or_default(),
        report_type: info.text_at(&["ReportType"]).unwrap_or_default(),
        submitted: parse_date(info.text_at(&["SubmittedDate"])),
        started: parse_date(info.text_at(&["StartedProcessingDate"])),
        completed: parse_date(info.text_at(&["CompletedDate"])),
        range_start: parse_date(info.text_at(&["StartDate"])),
        range_end: parse_date(info.text_at(&["EndDate"])),
        status: info
            .text_at(&["ReportProcessingStatus"])
            .unwrap_or_default()
            .to_uppercase(),
        generated_report_id: info.text_at(&["GeneratedReportId"]),
    }
}

fn parse_date(raw: Option<String>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?.as_str())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
