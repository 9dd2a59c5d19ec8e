use crate::config::{ClientConfig, PollConfig};
use crate::feed_manager::{FeedState, FeedSubmissionManager};
use crate::poll::CancelGate;
use crate::report_manager::ReportManager;
use crate::traits::Transport;
use crate::transport::{TransportClient, TransportStats};
use crate::types::Result;
use std::path::{Path, PathBuf};

/// One client per marketplace and credential pair. Owns the transport and
/// the state that outlives single calls: feed queues, the sequence counter
/// and the cancel spacing.
pub struct MwsClient<T: Transport = TransportClient> {
    transport: T,
    feeds: FeedState,
    cancel_gate: CancelGate,
    poll: PollConfig,
    tmp_dir: PathBuf,
    memory_threshold: usize,
}

impl MwsClient<TransportClient> {
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let poll = config.poll.clone();
        let tmp_dir = config.tmp_dir.clone();
        let memory_threshold = config.memory_threshold;
        let transport = TransportClient::connect(config).await?;
        Ok(Self::with_transport(transport, poll, tmp_dir).with_memory_threshold(memory_threshold))
    }

    pub async fn set_locale(&mut self, marketplace_id: &str) -> Result<()> {
        self.transport.set_locale(marketplace_id).await
    }

    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    pub fn take_stats(&mut self) -> TransportStats {
        self.transport.take_stats()
    }
}

impl<T: Transport> MwsClient<T> {
    pub fn with_transport(transport: T, poll: PollConfig, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            feeds: FeedState::default(),
            cancel_gate: CancelGate::new(),
            poll,
            tmp_dir: tmp_dir.into(),
            memory_threshold: 5 * 1024 * 1024,
        }
    }

    pub fn with_memory_threshold(mut self, bytes: usize) -> Self {
        self.memory_threshold = bytes;
        self
    }

    pub fn feeds(&mut self) -> FeedSubmissionManager<'_, T> {
        FeedSubmissionManager::new(
            &mut self.transport,
            &mut self.feeds,
            &self.poll,
            &mut self.cancel_gate,
            &self.tmp_dir,
        )
        .with_memory_threshold(self.memory_threshold)
    }

    pub fn reports(&mut self) -> ReportManager<'_, T> {
        ReportManager::new(
            &mut self.transport,
            &self.poll,
            &mut self.cancel_gate,
            &self.tmp_dir,
        )
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }
}
