// Downloader module - resolve, plan, download, record

pub mod backends;
pub mod diagnostics;
pub mod errors;
pub mod events;
pub mod executor;
pub mod extractors;
pub mod history;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod resolver;
pub mod tools;
pub mod traits;
pub mod utils;

pub use backends::YtDlpBackend;
pub use errors::{JobError, PersistenceError};
pub use events::{relay, EventReceiver, EventSender, JobState, ProgressEvent};
pub use executor::{Executor, JobOutcome};
pub use extractors::{CliMetadataSource, MetadataSource};
pub use history::{HistoryEntry, HistoryStore};
pub use models::{JobInfo, JobRequest, MediaFormat, Quality};
pub use orchestrator::{JobHandle, Orchestrator};
pub use planner::{JobDescriptor, Planner};
pub use resolver::Resolver;
pub use tools::{ToolInfo, ToolManager, Toolchain};
pub use traits::{DownloadBackend, ProgressReporter};
