pub mod credit;
pub mod loaders;
pub mod scan_job;
pub mod scan_queue;
pub mod session;

pub use credit::CreditTransaction;
pub use loaders::{load_all_manifests, load_manifest, JobManifest};
pub use scan_job::{
    DocumentHandle, ExtractedRecord, JobId, JobStatus, JobView, PageSelection,
    PageSelectionRequest, ProgressSnapshot, ScanJob,
};
pub use scan_queue::ScanQueue;
pub use session::SessionId;
