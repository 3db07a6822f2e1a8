//! 任务 / 运行报告
//!
//! 每个终止的任务都要让操作员知道：数据是否已导出、额度是否已退还。

use crate::models::{CreditTransaction, JobId, JobStatus, ScanJob};

/// 单个任务的报告
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub id: JobId,
    pub original_name: String,
    pub status: JobStatus,
    pub requested_pages: u32,
    pub processed_pages: u32,
    pub credits: CreditTransaction,
    pub exported: bool,
    /// 应退未退的页数（退款调用失败时非 0）
    pub refund_outstanding: u32,
    pub error: Option<String>,
}

impl JobReport {
    pub fn from_job(job: &ScanJob, refund_outstanding: u32) -> Self {
        Self {
            id: job.id,
            original_name: job.original_name.clone(),
            status: job.status(),
            requested_pages: job.required_credits(),
            processed_pages: job.processed_pages(),
            credits: job.credits,
            exported: job.exported,
            refund_outstanding,
            error: job.error().map(str::to_string),
        }
    }

    /// 一行摘要
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "已处理 {}/{} 页 | 扣除 {} | 退还 {} | {}",
            self.processed_pages,
            self.requested_pages,
            self.credits.deducted,
            self.credits.refunded,
            if self.exported { "已导出" } else { "未导出" }
        );
        if self.refund_outstanding > 0 {
            summary.push_str(&format!(" | ⚠️ 待退还 {}", self.refund_outstanding));
        }
        if let Some(error) = &self.error {
            summary.push_str(&format!(" | 错误: {}", error));
        }
        summary
    }
}

/// 一次运行的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 队列已排空
    Success,
    /// 操作员取消或中止
    Cancelled,
    /// 额度状态不明确（退款失败）或合并导出失败
    Error,
}

/// 一次运行的报告
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub jobs: Vec<JobReport>,
    /// 账本最近返回的余额
    pub balance: Option<i64>,
    /// 仍在等待下次运行的任务数
    pub pending_jobs: usize,
}

impl RunReport {
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    pub fn total_charged(&self) -> u32 {
        self.jobs.iter().map(|j| j.credits.charged()).sum()
    }

    pub fn total_refunded(&self) -> u32 {
        self.jobs.iter().map(|j| j.credits.refunded).sum()
    }

    pub fn job(&self, id: JobId) -> Option<&JobReport> {
        self.jobs.iter().find(|j| j.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_flags_outstanding_refunds() {
        let report = JobReport {
            id: JobId(7),
            original_name: "b.pdf".into(),
            status: JobStatus::Cancelled,
            requested_pages: 3,
            processed_pages: 1,
            credits: CreditTransaction {
                requested: 3,
                deducted: 3,
                refunded: 0,
            },
            exported: false,
            refund_outstanding: 2,
            error: None,
        };
        let summary = report.summary();
        assert!(summary.starts_with("已处理 1/3 页"));
        assert!(summary.contains("待退还 2"));
        assert!(summary.contains("未导出"));
    }
}
