//! Prospector engine: batched collection pipeline and command dispatch.
mod context;
mod decode;
mod engine;
mod extract;
mod orchestrator;
mod report;
mod retry;
mod session;
mod staging;
mod types;

pub use context::{FetchSettings, HttpPageContext};
pub use decode::{decode_page, DecodeError, DecodedPage};
pub use engine::{EngineConfig, EngineHandle};
pub use extract::{estimate_monthly_sales, ExtractionFault, ListingExtractor, SelectorExtractor};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use report::{ChannelProgressSink, ProgressSink};
pub use retry::{RetryController, RetrySettings};
pub use session::{ManagedSession, SessionManager, SharedRun, WorkerContext, WorkerSession};
pub use staging::{StagedRun, StagingError, StagingStore};
pub use types::{CommandAck, EngineEvent, PageDocument, SessionError};
