pub mod config;
pub mod dates;
pub mod error;
pub mod feed;
pub mod html;
pub mod importer;
pub mod log;
pub mod parser;
pub mod scheduler;
pub mod sideload;
pub mod storage;

pub use config::{ImportSettings, PostStatus, Schedule};
pub use dates::{resolve, DateParts, ResolvedDates};
pub use error::{ConfigError, ImportError, SideloadError, StoreError};
pub use feed::{FeedItem, NormalizedEvent};
pub use html::first_image;
pub use importer::{ImportCounts, ImportSummary, Importer};
pub use log::{ImportLog, LogLevel, LogLine};
pub use parser::{fetch_and_parse, parse_document};
pub use scheduler::{
    run_once, shared_settings, spawn_scheduler, Event, SchedulerConfig, SchedulerHandle,
    SharedSettings,
};
pub use sideload::{HttpImageSideloader, ImageSideloader};
pub use storage::{Attachment, EventFields, EventId, EventStore, JsonEventStore, PersistedEvent};
