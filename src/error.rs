// Typed errors for the engine; the binary wraps these in anyhow at the edge

use thiserror::Error;

/// A producer event that cannot be translated into an update. The event is logged and
/// skipped; the subscriber keeps running.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("DNS race sample carried no results")]
    EmptyDnsRace,
    #[error("DNS race result #{index} has a blank resolver name")]
    BlankResolver { index: usize },
    #[error("route snapshot contains a blank outbound tag")]
    BlankOutboundTag,
    #[error("streaming snapshot contains a blank session id")]
    BlankSessionId,
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("aggregator task failed: {0}")]
    Aggregator(#[from] tokio::task::JoinError),
}
