use crate::error::{ManifestError, ScanError};
use crate::models::scan_job::{DocumentHandle, PageSelectionRequest, ScanJob};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 任务清单（每个 TOML 文件描述一个待扫描文档）
///
/// ```toml
/// file = "invoices/march.pdf"
/// original_name = "三月发票.pdf"
/// total_pages = 5
/// page_range = "1,3-4"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct JobManifest {
    /// 文档路径（相对路径以清单所在目录为基准）
    pub file: PathBuf,
    #[serde(default)]
    pub original_name: Option<String>,
    pub total_pages: u32,
    #[serde(flatten)]
    pub selection: PageSelectionRequest,
    #[serde(skip)]
    pub manifest_path: Option<PathBuf>,
}

impl JobManifest {
    /// 文档的实际路径
    pub fn document_path(&self) -> PathBuf {
        if self.file.is_absolute() {
            return self.file.clone();
        }
        match self.manifest_path.as_deref().and_then(Path::parent) {
            Some(dir) => dir.join(&self.file),
            None => self.file.clone(),
        }
    }

    /// 转换为待入队的扫描任务
    pub fn into_job(self) -> Result<ScanJob, ScanError> {
        let handle = DocumentHandle::new(self.document_path());
        let name = self
            .original_name
            .clone()
            .unwrap_or_else(|| handle.file_name());
        ScanJob::new(handle, name, self.total_pages, self.selection)
    }
}

/// 从 TOML 文件加载任务清单
pub async fn load_manifest(manifest_path: &Path) -> Result<JobManifest, ManifestError> {
    let display = manifest_path.display().to_string();
    let content = fs::read_to_string(manifest_path)
        .await
        .map_err(|source| ManifestError::ReadFailed {
            path: display.clone(),
            source,
        })?;

    let mut manifest: JobManifest =
        toml::from_str(&content).map_err(|source| ManifestError::TomlParseFailed {
            path: display.clone(),
            source,
        })?;

    if manifest.total_pages == 0 {
        return Err(ManifestError::InvalidPageCount(display));
    }

    manifest.manifest_path = Some(manifest_path.to_path_buf());
    Ok(manifest)
}

/// 从文件夹中加载所有任务清单（按文件名排序，保证入队顺序稳定）
pub async fn load_all_manifests(folder_path: &str) -> Result<Vec<JobManifest>, ManifestError> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        return Err(ManifestError::DirectoryNotFound(folder_path.to_string()));
    }

    let read_failed = |source| ManifestError::ReadFailed {
        path: folder_path.to_string(),
        source,
    };

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder).await.map_err(read_failed)?;
    while let Some(entry) = entries.next_entry().await.map_err(read_failed)? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut manifests = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_manifest(&path).await {
            Ok(manifest) => {
                tracing::info!("成功加载，共 {} 页", manifest.total_pages);
                manifests.push(manifest);
            }
            Err(e) => {
                tracing::warn!("加载清单失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(manifests)
}
