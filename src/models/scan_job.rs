//! 扫描任务 - 单个上传文件的扫描生命周期
//!
//! 任务在入队时创建（`Pending`），之后只由当前持有它的 `JobRunner` 修改，
//! 终止状态只会被设置一次。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ScanError;
use crate::models::credit::CreditTransaction;

/// 识别服务返回的一条记录（列名 → 值），列映射由导出端负责
pub type ExtractedRecord = serde_json::Map<String, serde_json::Value>;

/// 任务ID（入队时分配，单调递增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Scanning,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Cancelled)
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Pending => "等待中",
            JobStatus::Scanning => "扫描中",
            JobStatus::Done => "完成",
            JobStatus::Error => "失败",
            JobStatus::Cancelled => "已取消",
        }
    }
}

/// 已解析的页码选择
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSelection {
    /// 全部页
    All,
    /// 升序、去重的页码（从 1 开始）
    Pages(Vec<u32>),
}

impl PageSelection {
    /// 展开为具体页码
    pub fn pages(&self, total_pages: u32) -> Vec<u32> {
        match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Pages(pages) => pages.clone(),
        }
    }

    /// 需要扣除的额度（页数）
    pub fn count(&self, total_pages: u32) -> u32 {
        match self {
            PageSelection::All => total_pages,
            PageSelection::Pages(pages) => pages.len() as u32,
        }
    }

    pub fn contains(&self, page: u32, total_pages: u32) -> bool {
        match self {
            PageSelection::All => (1..=total_pages).contains(&page),
            PageSelection::Pages(pages) => pages.binary_search(&page).is_ok(),
        }
    }
}

/// 操作员提交的原始页码选择
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelectionRequest {
    #[serde(default)]
    pub start_page: Option<u32>,
    #[serde(default)]
    pub end_page: Option<u32>,
    #[serde(default)]
    pub page_range: Option<String>,
}

impl PageSelectionRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn bounds(start: u32, end: u32) -> Self {
        Self {
            start_page: Some(start),
            end_page: Some(end),
            page_range: None,
        }
    }

    pub fn range(range: impl Into<String>) -> Self {
        Self {
            page_range: Some(range.into()),
            ..Self::default()
        }
    }
}

/// 文档句柄
///
/// 只持有路径，控制器不会复制文件内容；克隆代价很低
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle(Arc<PathBuf>);

impl DocumentHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(Arc::new(path.into()))
    }

    pub fn path(&self) -> &Path {
        self.0.as_path()
    }

    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}

/// 最近一次进度推送
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub percentage: f32,
    pub message: String,
}

/// 扫描任务
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub id: JobId,
    pub file: DocumentHandle,
    pub original_name: String,
    pub total_pages: u32,
    pub selection: PageSelectionRequest,
    pages_to_scan: Option<PageSelection>,
    status: JobStatus,
    received_pages: BTreeSet<u32>,
    records: BTreeMap<u32, Vec<ExtractedRecord>>,
    error: Option<String>,
    pub credits: CreditTransaction,
    pub exported: bool,
    pub last_progress: Option<ProgressSnapshot>,
}

impl ScanJob {
    /// 创建新的扫描任务（ID 在入队时分配）
    ///
    /// 总页数为 0 的文档没有可扫描的页，直接拒绝
    pub fn new(
        file: DocumentHandle,
        original_name: impl Into<String>,
        total_pages: u32,
        selection: PageSelectionRequest,
    ) -> Result<Self, ScanError> {
        if total_pages == 0 {
            return Err(ScanError::invalid_range("total_pages=0", "总页数必须大于 0"));
        }
        Ok(Self {
            id: JobId(0),
            file,
            original_name: original_name.into(),
            total_pages,
            selection,
            pages_to_scan: None,
            status: JobStatus::Pending,
            received_pages: BTreeSet::new(),
            records: BTreeMap::new(),
            error: None,
            credits: CreditTransaction::default(),
            exported: false,
            last_progress: None,
        })
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn pages_to_scan(&self) -> Option<&PageSelection> {
        self.pages_to_scan.as_ref()
    }

    pub fn received_pages(&self) -> &BTreeSet<u32> {
        &self.received_pages
    }

    pub fn records(&self) -> &BTreeMap<u32, Vec<ExtractedRecord>> {
        &self.records
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 请求的页数；尚未解析时为 0
    pub fn required_credits(&self) -> u32 {
        self.pages_to_scan
            .as_ref()
            .map(|s| s.count(self.total_pages))
            .unwrap_or(0)
    }

    pub fn processed_pages(&self) -> u32 {
        self.received_pages.len() as u32
    }

    /// 按页码顺序展开所有记录
    pub fn flattened_records(&self) -> Vec<(u32, ExtractedRecord)> {
        self.records
            .iter()
            .flat_map(|(page, recs)| recs.iter().map(move |r| (*page, r.clone())))
            .collect()
    }

    pub fn has_records(&self) -> bool {
        self.records.values().any(|r| !r.is_empty())
    }

    pub(crate) fn set_pages_to_scan(&mut self, selection: PageSelection) {
        if self.status == JobStatus::Pending {
            self.pages_to_scan = Some(selection);
        }
    }

    pub(crate) fn begin_scanning(&mut self) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Scanning;
        }
    }

    /// 记录一页完成结果
    ///
    /// 只接受扫描中、且在请求范围内的页；返回是否为新收到的页
    pub(crate) fn record_page(&mut self, page: u32, records: Vec<ExtractedRecord>) -> bool {
        if self.status != JobStatus::Scanning {
            return false;
        }
        let in_selection = self
            .pages_to_scan
            .as_ref()
            .is_some_and(|s| s.contains(page, self.total_pages));
        if !in_selection {
            return false;
        }

        let is_new = self.received_pages.insert(page);
        if is_new && !records.is_empty() {
            self.records.insert(page, records);
        }
        is_new
    }

    /// 设置终止状态；已经终止的任务不会被再次修改
    pub(crate) fn finish(&mut self, status: JobStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        true
    }

    /// 未开始扫描就被拒绝（例如页码无效）
    pub(crate) fn reject(&mut self, error: String) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Error;
        self.error = Some(error);
        true
    }

    /// 只读视图，供展示层使用
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            original_name: self.original_name.clone(),
            status: self.status,
            requested_pages: self.required_credits(),
            received_pages: self.processed_pages(),
            percentage: self.last_progress.as_ref().map(|p| p.percentage),
            message: self.last_progress.as_ref().map(|p| p.message.clone()),
            error: self.error.clone(),
            credits: self.credits,
            exported: self.exported,
        }
    }
}

/// 任务的只读快照
#[derive(Debug, Clone, PartialEq)]
pub struct JobView {
    pub id: JobId,
    pub original_name: String,
    pub status: JobStatus,
    pub requested_pages: u32,
    pub received_pages: u32,
    pub percentage: Option<f32>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub credits: CreditTransaction,
    pub exported: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: &str) -> ExtractedRecord {
        let mut r = ExtractedRecord::new();
        r.insert("field".into(), json!(value));
        r
    }

    fn scanning_job(pages: Vec<u32>) -> ScanJob {
        let mut job = ScanJob::new(
            DocumentHandle::new("invoice.pdf"),
            "invoice.pdf",
            5,
            PageSelectionRequest::range("1,3-4"),
        )
        .unwrap();
        job.set_pages_to_scan(PageSelection::Pages(pages));
        job.begin_scanning();
        job
    }

    #[test]
    fn selection_all_expands_to_every_page() {
        let sel = PageSelection::All;
        assert_eq!(sel.pages(3), vec![1, 2, 3]);
        assert_eq!(sel.count(3), 3);
        assert!(sel.contains(3, 3));
        assert!(!sel.contains(4, 3));
    }

    #[test]
    fn record_page_ignores_pages_outside_selection() {
        let mut job = scanning_job(vec![1, 3, 4]);
        assert!(job.record_page(1, vec![record("a")]));
        assert!(!job.record_page(2, vec![record("b")]));
        assert!(!job.record_page(1, vec![record("dup")]));
        assert_eq!(job.processed_pages(), 1);
        assert_eq!(job.records().len(), 1);
        assert_eq!(job.records()[&1][0]["field"], json!("a"));
    }

    #[test]
    fn empty_pages_count_as_received_without_records() {
        let mut job = scanning_job(vec![1, 3, 4]);
        assert!(job.record_page(3, Vec::new()));
        assert_eq!(job.processed_pages(), 1);
        assert!(!job.has_records());
    }

    #[test]
    fn terminal_state_is_set_once() {
        let mut job = scanning_job(vec![1]);
        assert!(job.finish(JobStatus::Cancelled, None));
        assert!(!job.finish(JobStatus::Done, None));
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert!(!job.record_page(1, vec![record("late")]));
    }

    #[test]
    fn pending_job_can_be_rejected_before_scanning() {
        let mut job =
            ScanJob::new(DocumentHandle::new("a.pdf"), "a.pdf", 2, PageSelectionRequest::all())
                .unwrap();
        assert!(job.reject("bad range".into()));
        assert_eq!(job.status(), JobStatus::Error);
        assert_eq!(job.error(), Some("bad range"));
    }

    #[test]
    fn zero_page_document_is_rejected() {
        let err = ScanJob::new(DocumentHandle::new("blank.pdf"), "blank.pdf", 0, PageSelectionRequest::all())
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidRange { .. }));
    }
}
