//! 失败记录服务 - 业务能力层
//!
//! 只负责"追加写失败任务记录"能力，不关心流程

use anyhow::Result;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::orchestrator::report::JobReport;
use crate::utils::truncate_text;

/// 失败记录服务
///
/// 职责：
/// - 将失败 / 取消的任务写入文本文件，便于操作员核对额度
/// - 只处理单个任务
pub struct FailureLog {
    path: String,
}

impl FailureLog {
    pub fn new() -> Self {
        Self {
            path: "failed_jobs.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 追加一条记录
    pub async fn write(&self, report: &JobReport) -> Result<()> {
        debug!("写入失败记录: {} ({})", report.original_name, report.status.label());

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let line = format!(
            "{} | {} | {} | {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            report.original_name,
            report.status.label(),
            truncate_text(&report.summary(), 200)
        );

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}

impl Default for FailureLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreditTransaction, JobId, JobStatus};

    #[tokio::test]
    async fn appends_one_line_per_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed.txt");
        let log = FailureLog::with_path(path.to_string_lossy());

        let report = JobReport {
            id: JobId(1),
            original_name: "a.pdf".into(),
            status: JobStatus::Error,
            requested_pages: 3,
            processed_pages: 2,
            credits: CreditTransaction {
                requested: 3,
                deducted: 3,
                refunded: 3,
            },
            exported: true,
            refund_outstanding: 0,
            error: Some("结果不完整".into()),
        };
        log.write(&report).await.unwrap();
        log.write(&report).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("a.pdf | 失败"));
    }
}
