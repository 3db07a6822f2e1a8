//! 导出服务 - 业务能力层
//!
//! 只负责"把记录写成表格"能力，不关心扣费和流程。
//! 列映射由导出端决定：`page` 列在前，其后是所有记录字段名的并集（排序）。

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ExportError;
use crate::models::scan_job::ExtractedRecord;

/// 一个文件的待导出记录（页码, 记录）
#[derive(Debug, Clone, Default)]
pub struct ExportBatch {
    pub source_file: String,
    pub records: Vec<(u32, ExtractedRecord)>,
}

/// 导出端
#[async_trait]
pub trait ExportSink: Send + Sync {
    /// 导出单个任务的记录
    async fn export(
        &self,
        filename: &str,
        records: &[(u32, ExtractedRecord)],
    ) -> Result<(), ExportError>;

    /// 合并导出多个任务的记录
    async fn export_combined(&self, batches: &[ExportBatch]) -> Result<(), ExportError>;
}

/// CSV 文件导出端
pub struct CsvExportSink {
    folder: PathBuf,
}

impl CsvExportSink {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// 单个任务的导出路径
    pub fn job_path(&self, filename: &str) -> PathBuf {
        let stem = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| filename.to_string());
        self.folder.join(format!("{}.csv", sanitize(&stem)))
    }

    /// 合并导出的路径（带时间戳）
    pub fn combined_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.folder.join(format!("combined_{}.csv", stamp))
    }

    async fn write(&self, path: &Path, bytes: Vec<u8>) -> Result<(), ExportError> {
        let shown = path.display().to_string();
        tokio::fs::create_dir_all(&self.folder)
            .await
            .map_err(|e| ExportError::io(self.folder.display().to_string(), e))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| ExportError::io(shown.clone(), e))?;
        info!("📄 已导出: {}", shown);
        Ok(())
    }
}

#[async_trait]
impl ExportSink for CsvExportSink {
    async fn export(
        &self,
        filename: &str,
        records: &[(u32, ExtractedRecord)],
    ) -> Result<(), ExportError> {
        if records.is_empty() {
            return Err(ExportError::Empty(filename.to_string()));
        }
        debug!("导出 {} 条记录: {}", records.len(), filename);

        let rows = records.iter().map(|(page, r)| (None, *page, r));
        let bytes = render_csv(rows, false)?;
        self.write(&self.job_path(filename), bytes).await
    }

    async fn export_combined(&self, batches: &[ExportBatch]) -> Result<(), ExportError> {
        let total: usize = batches.iter().map(|b| b.records.len()).sum();
        if total == 0 {
            return Err(ExportError::Empty("combined".to_string()));
        }
        debug!("合并导出 {} 个文件，共 {} 条记录", batches.len(), total);

        let rows = batches.iter().flat_map(|b| {
            b.records
                .iter()
                .map(move |(page, r)| (Some(b.source_file.as_str()), *page, r))
        });
        let bytes = render_csv(rows, true)?;
        self.write(&self.combined_path(), bytes).await
    }
}

/// 渲染 CSV：`[source_file,] page, 字段...`
fn render_csv<'a, I>(rows: I, with_source: bool) -> Result<Vec<u8>, ExportError>
where
    I: Iterator<Item = (Option<&'a str>, u32, &'a ExtractedRecord)> + Clone,
{
    let columns: BTreeSet<&str> = rows
        .clone()
        .flat_map(|(_, _, r)| r.keys().map(String::as_str))
        .collect();

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    let mut header: Vec<&str> = Vec::with_capacity(columns.len() + 2);
    if with_source {
        header.push("source_file");
    }
    header.push("page");
    header.extend(columns.iter().copied());
    writer.write_record(&header)?;

    for (source, page, record) in rows {
        let mut row: Vec<String> = Vec::with_capacity(header.len());
        if with_source {
            row.push(source.unwrap_or_default().to_string());
        }
        row.push(page.to_string());
        for column in &columns {
            row.push(cell(record.get(*column)));
        }
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::io("csv buffer", e.into_error()))
}

fn cell(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}
