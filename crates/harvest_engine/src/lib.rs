//! Harvest engine: page fetching, extraction, the harvester driver and sinks.
mod config;
mod decode;
mod engine;
mod export;
mod extract;
mod fetch;
mod harvester;
mod persist;
mod types;
mod worker;

pub use config::{DelayPolicy, HarvestConfig, HarvestSettings, SettingsError};
pub use decode::{decode_text, DecodeError, DecodedText};
pub use engine::{EngineHandle, HarvestJob};
pub use export::{export_rows, read_batch, write_batches, ExportError, ExportSummary};
pub use extract::{FieldSelector, HtmlItemExtractor, ItemExtractor, ItemParseError, JsonItemExtractor};
pub use fetch::{
    ChannelProgressSink, FetchSettings, HttpPageFetcher, PageFetcher, PageRequest, ProgressSink,
    ResponseFormat,
};
pub use harvester::Harvester;
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use types::{
    EngineEvent, FetchError, FetchErrorKind, JobId, Page, PageResult, Payload, RawPage,
    SessionProgress,
};
pub use worker::{BatchReport, BatchWorker, KeyOutcome, SessionFactory, SessionSetupError};
