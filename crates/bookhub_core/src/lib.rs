//! BookHub core: pure record model, merge and convergence bookkeeping,
//! lifecycle state machine and the wire protocol types.
mod collection;
mod convergence;
mod lifecycle;
mod metadata;
mod protocol;
mod record;
mod session;
mod snapshot;
mod title;

pub use collection::{merge, Collection};
pub use convergence::{
    ConvergenceTracker, HarvestSettings, Progress, StepOutcome, Verdict, DEFAULT_EXTENT_EPSILON,
    DEFAULT_IDLE_TOLERANCE, DEFAULT_INTERVAL_MS, DEFAULT_MAX_ITERATIONS,
};
pub use lifecycle::{update, LifecycleEffect, LifecycleMsg, LifecycleTable, SurfaceRecord};
pub use metadata::{EnrichedRecord, MetadataSource, OwnershipStatus};
pub use protocol::{
    Ack, EnrichRequest, EnrichResponse, MessageSender, OpenSurfaceRequest, Request, SurfaceResponse,
    SyncFinished, SyncTrigger,
};
pub use record::{Record, RecordError, RecordKey, MAX_TITLE_CHARS, PLACEHOLDER_TITLE};
pub use session::{SessionState, SessionStatus};
pub use snapshot::{Snapshot, SNAPSHOT_KEY};
pub use title::{extract_volume, normalize_text, normalize_title};

pub type TabId = u64;
pub type WindowId = u64;
