use crate::transport::ResponseBody;
use crate::types::{Params, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Read;

/// Request payload for POST calls.
pub type RequestBody = Box<dyn Read + Send>;

/// Trait for issuing signed calls against the marketplace service
#[async_trait]
pub trait Transport: Send {
    /// Sign and issue one call. Supplying a body turns the call into a POST
    async fn call(
        &mut self,
        action: &str,
        params: Params,
        body: Option<RequestBody>,
    ) -> Result<ResponseBody>;

    /// Marketplace id sent with every call
    fn marketplace_id(&self) -> &str;

    fn merchant_id(&self) -> &str;

    /// Identifier for feed envelope headers: the auth token when one is
    /// configured, else the merchant id
    fn merchant_identifier(&self) -> &str {
        self.merchant_id()
    }

    /// Current time as the service sees it
    fn server_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
