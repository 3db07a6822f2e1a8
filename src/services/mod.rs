pub mod export_sink;
pub mod failure_log;
pub mod page_range;

pub use export_sink::{CsvExportSink, ExportBatch, ExportSink};
pub use failure_log::FailureLog;
