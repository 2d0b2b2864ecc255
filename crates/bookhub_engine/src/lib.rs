//! BookHub engine: harvest loop, sessions, relay and the IO behind them.
mod agent;
mod bridge;
mod controller;
mod decode;
mod driver;
mod enrich;
mod extract;
mod fetch;
mod paged;
mod persist;
mod relay;
mod session;
mod source;
mod store;
mod types;

pub use agent::{
    is_auto_sync, with_auto_sync, AgentMode, LibraryRefresher, PageAgent, RefreshGuard,
    AUTO_SYNC_PARAM, RETRY_DELAYS_MS,
};
pub use bridge::{
    DashboardBridge, DashboardPage, PageEvent, PageMessage, PageWindow, DASHBOARD_SOURCE,
    EXTENSION_SOURCE, GET_SNAPSHOT, SNAPSHOT, START_SYNC, START_SYNC_RESULT,
};
pub use controller::{ConvergenceController, HarvestRun, ProgressSink, RunOutcome};
pub use decode::{decode_page, DecodeError, DecodedPage};
pub use driver::ProgressDriver;
pub use enrich::{
    BooksApiEnricher, EnrichSettings, EnrichmentService, LocalEnricher, DEFAULT_VOLUMES_ENDPOINT,
};
pub use extract::{extract_product, is_library_page, Extractor, LibraryExtractor, ProductInfo};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use paged::{PagedHttpSource, PAGE_PARAM};
pub use persist::{DurableDir, PersistError};
pub use relay::{
    relay_channel, Coordinator, CoordinatorState, Envelope, RelayClient, RelayError,
    SurfaceError, SurfaceHost, ENVELOPE_BUFFER,
};
pub use session::{CompletionNotifier, SessionError, SessionResult, SyncHandle, SyncSession};
pub use source::HarvestSource;
pub use store::{DirSnapshotStore, MemorySnapshotStore, SnapshotStore, StoreError};
pub use types::{
    FailureKind, FetchError, FetchMetadata, FetchOutput, SourceError, SourceErrorKind,
};
