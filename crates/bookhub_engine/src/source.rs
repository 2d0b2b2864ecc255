use bookhub_core::Record;

use crate::SourceError;

/// A live, lazily rendered listing that can be asked to show more entries.
///
/// `extent` is an opaque monotonic growth metric (scroll height, loaded
/// bytes); only its increase between two reads matters.
#[async_trait::async_trait]
pub trait HarvestSource: Send + Sync {
    /// Location reported in snapshots.
    fn url(&self) -> String;

    async fn extent(&self) -> Result<f64, SourceError>;

    /// Scroll to the end and activate a "load more" control if one exists.
    async fn reveal_more(&self) -> Result<(), SourceError>;

    /// Candidate records currently present in the page.
    async fn extract(&self) -> Result<Vec<Record>, SourceError>;

    async fn scroll_to_start(&self) -> Result<(), SourceError>;
}
