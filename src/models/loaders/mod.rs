pub mod manifest_loader;

pub use manifest_loader::{load_all_manifests, load_manifest, JobManifest};
