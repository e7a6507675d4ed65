//! pagesheet — selector-driven page extraction, enrichment, and spreadsheet export.

pub mod acquire;
pub mod config;
pub mod enrich;
pub mod export;
pub mod extract;
pub mod pipeline;
pub mod presets;
pub mod renderer;
pub mod translate;
pub mod types;

pub use acquire::http_client::HttpClient;
pub use acquire::PageAcquirer;
pub use config::PipelineConfig;
pub use enrich::{EnrichOutcome, Enricher};
pub use export::{ExportPlan, ExportResult, Exporter};
pub use extract::{extract, CompiledMapping, DomSnapshot, PageContent};
pub use pipeline::{Collected, Job, Pipeline, RunOutcome};
pub use presets::{preset, PRESET_NAMES};
pub use translate::{GoogleTranslator, Translator};
pub use types::*;
