//! 任务执行流程 - 流程层
//!
//! 核心职责：把"一个扫描任务"推进到终止状态
//!
//! 流程顺序：
//! 1. 解析页码 → 计算所需额度
//! 2. 扣费（失败则任务保持 `Pending`，交给操作员决定；
//!    运行已取消则不扣费，任务同样保持 `Pending`）
//! 3. 进入 `Scanning`，生成会话ID并订阅进度
//! 4. 提交远程识别，同时把进度推送写入任务
//! 5. 取消订阅
//! 6. 核对收到的页数，决定终止状态和退款
//! 7. 有记录就导出（失败、取消也导出）

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clients::{
    CreditLedgerClient, PageOutcome, ProgressChannel, ProgressUpdate, RemoteScanInvoker,
};
use crate::config::{Config, ExportMode};
use crate::error::{ExportError, RemoteError, ScanError};
use crate::models::{CreditTransaction, JobStatus, ProgressSnapshot, ScanJob, SessionId};
use crate::orchestrator::report::JobReport;
use crate::services::{page_range, ExportSink};
use crate::utils::truncate_text;
use crate::workflow::job_ctx::JobCtx;

/// 任务执行依赖的外部协作方
#[derive(Clone)]
pub struct JobServices {
    pub ledger: Arc<dyn CreditLedgerClient>,
    pub invoker: Arc<dyn RemoteScanInvoker>,
    pub progress: Arc<dyn ProgressChannel>,
    pub sink: Arc<dyn ExportSink>,
}

/// 单个任务的执行结果
///
/// 只有进入过 `Scanning` 的任务才会产生结果；
/// 扣费之前的失败以 `Err(ScanError)` 返回
#[derive(Debug)]
pub struct JobOutcome {
    pub report: JobReport,
    /// `IncompleteResult` 或 `RemoteInvocation`（任务状态为 `Error` 时）
    pub failure: Option<ScanError>,
    /// 导出失败不影响额度核算
    pub export_error: Option<ExportError>,
    /// 账本最近返回的余额
    pub balance: Option<i64>,
}

/// 进度订阅守卫，离开作用域时取消订阅
struct SubscriptionGuard<'a> {
    channel: &'a dyn ProgressChannel,
    session_id: SessionId,
}

impl Drop for SubscriptionGuard<'_> {
    fn drop(&mut self) {
        self.channel.unsubscribe(&self.session_id);
    }
}

/// 任务执行流程
///
/// - 一次只执行一个任务
/// - 每个任务恰好扣费一次，最多退款一次，最多导出一次
/// - 进度订阅严格限定在扫描期间
pub struct JobRunner {
    services: JobServices,
    user_id: String,
    export_mode: ExportMode,
    verbose_logging: bool,
}

impl JobRunner {
    /// 创建新的任务执行流程
    pub fn new(services: JobServices, config: &Config) -> Self {
        Self {
            services,
            user_id: config.user_id.clone(),
            export_mode: config.export_mode,
            verbose_logging: config.verbose_logging,
        }
    }

    pub fn services(&self) -> &JobServices {
        &self.services
    }

    pub fn export_mode(&self) -> ExportMode {
        self.export_mode
    }

    /// 执行一个任务
    ///
    /// `observe` 在任务状态变化时被调用，用于发布只读快照。
    /// 扣费前已取消时返回 `ScanError::NotStarted`，任务不被修改
    pub async fn run(
        &self,
        job: &mut ScanJob,
        job_index: usize,
        token: &CancellationToken,
        observe: &mut (dyn FnMut(&ScanJob) + Send),
    ) -> Result<JobOutcome, ScanError> {
        let ctx = JobCtx::new(job.id, job_index);

        if token.is_cancelled() {
            info!("[任务 {}] 运行已取消，不再扣费", ctx.job_index);
            return Err(ScanError::NotStarted);
        }

        // ========== 1. 解析页码 ==========
        if job.pages_to_scan().is_none() {
            match page_range::resolve(&job.selection, job.total_pages) {
                Ok(selection) => job.set_pages_to_scan(selection),
                Err(e) => {
                    warn!("[任务 {}] ⚠️ 页码选择无效，拒绝任务: {}", ctx.job_index, e);
                    job.reject(e.to_string());
                    observe(job);
                    return Err(e);
                }
            }
        }
        let pages = job
            .pages_to_scan()
            .map(|s| s.pages(job.total_pages))
            .unwrap_or_default();
        let required = pages.len() as u32;
        job.credits = CreditTransaction::new(required);

        log_job_start(&ctx, job, required);

        // ========== 2. 扣费 ==========
        let receipt = self
            .services
            .ledger
            .deduct(&self.user_id, required)
            .await
            .map_err(|source| {
                error!("[任务 {}] ❌ 扣除 {} 页额度失败: {}", ctx.job_index, required, source);
                ScanError::CreditDeduction {
                    requested: required,
                    source,
                }
            })?;
        if receipt.pages != required {
            warn!(
                "[任务 {}] 账本回执页数 {} 与请求 {} 不一致，按请求记账",
                ctx.job_index, receipt.pages, required
            );
        }
        job.credits.record_deduction(required);
        let mut balance = Some(receipt.new_balance);
        info!(
            "[任务 {}] 💳 已扣除 {} 页额度，余额 {}",
            ctx.job_index, required, receipt.new_balance
        );

        // ========== 3. 进入扫描 ==========
        job.begin_scanning();
        observe(job);

        let remote_error = if token.is_cancelled() {
            info!("[任务 {}] 已请求取消，跳过远程调用", ctx.job_index);
            None
        } else {
            self.scan(job, &ctx, &pages, token, observe).await
        };

        // ========== 6. 核对 ==========
        let processed = job.processed_pages();
        let cancelled = token.is_cancelled();
        let (status, failure, refund) = if processed == required {
            if let Some(e) = &remote_error {
                warn!(
                    "[任务 {}] 远程调用报错但所有页已通过进度送达，按完成处理: {}",
                    ctx.job_index, e
                );
            }
            (JobStatus::Done, None, 0)
        } else if cancelled {
            (JobStatus::Cancelled, None, required - processed)
        } else {
            let failure = match remote_error {
                Some(e) => ScanError::RemoteInvocation(e),
                None => ScanError::IncompleteResult {
                    requested: required,
                    received: processed,
                },
            };
            (JobStatus::Error, Some(failure), required)
        };

        let mut refund_outstanding = 0;
        if refund > 0 {
            match self.services.ledger.refund(&self.user_id, refund).await {
                Ok(receipt) => {
                    job.credits.record_refund(refund);
                    balance = Some(receipt.new_balance);
                    info!(
                        "[任务 {}] 💰 已退还 {} 页额度，余额 {}",
                        ctx.job_index, refund, receipt.new_balance
                    );
                }
                Err(e) => {
                    error!(
                        "[任务 {}] ❌ 退还 {} 页额度失败，需要人工核对: {}",
                        ctx.job_index, refund, e
                    );
                    refund_outstanding = refund;
                }
            }
        }

        job.finish(status, failure.as_ref().map(ToString::to_string));
        observe(job);

        // ========== 7. 导出 ==========
        let export_error = if job.has_records() && self.export_mode == ExportMode::Separate {
            self.export(job, &ctx).await.err()
        } else {
            None
        };
        if export_error.is_some() {
            observe(job);
        }

        let report = JobReport::from_job(job, refund_outstanding);
        log_job_complete(&ctx, &report);

        Ok(JobOutcome {
            report,
            failure,
            export_error,
            balance,
        })
    }

    /// 提交远程识别并同步进度，返回远程调用错误（如有）
    async fn scan(
        &self,
        job: &mut ScanJob,
        ctx: &JobCtx,
        pages: &[u32],
        token: &CancellationToken,
        observe: &mut (dyn FnMut(&ScanJob) + Send),
    ) -> Option<RemoteError> {
        let progress = self.services.progress.as_ref();
        let mut subscription = progress.subscribe(&ctx.session_id);
        let _guard = SubscriptionGuard {
            channel: progress,
            session_id: ctx.session_id,
        };

        info!("[任务 {}] 📤 提交识别 {} 页 {}", ctx.job_index, pages.len(), ctx);

        let file = job.file.clone();
        let submit = self.services.invoker.submit(&file, pages, &ctx.session_id);
        tokio::pin!(submit);

        let mut progress_open = true;
        let mut cancel_sent = false;

        let result = loop {
            tokio::select! {
                biased;
                result = &mut submit => break result,
                update = subscription.next(), if progress_open => match update {
                    Some(update) => {
                        self.apply_update(job, ctx, update);
                        observe(job);
                    }
                    None => progress_open = false,
                },
                _ = token.cancelled(), if !cancel_sent => {
                    cancel_sent = true;
                    self.send_cancel(ctx).await;
                }
            }
        };

        // 远程返回前已到达但尚未读取的推送
        for update in subscription.drain() {
            self.apply_update(job, ctx, update);
        }

        match result {
            Ok(response) => {
                debug!(
                    "[任务 {}] 远程返回 {} 页结果 (success={})",
                    ctx.job_index,
                    response.pages.len(),
                    response.success
                );
                self.merge_pages(job, ctx, response.pages);
                observe(job);
                None
            }
            Err(e) => {
                error!("[任务 {}] ❌ 远程调用失败: {}", ctx.job_index, e);
                Some(e)
            }
        }
    }

    fn apply_update(&self, job: &mut ScanJob, ctx: &JobCtx, update: ProgressUpdate) {
        if self.verbose_logging {
            debug!(
                "[任务 {}] 进度 {:.0}% {}",
                ctx.job_index, update.percentage, update.message
            );
        }
        job.last_progress = Some(ProgressSnapshot {
            percentage: update.percentage,
            message: update.message,
        });
        self.merge_pages(job, ctx, update.page_results);
    }

    /// 合并逐页结果：出错的页和未请求的页都被忽略
    fn merge_pages(&self, job: &mut ScanJob, ctx: &JobCtx, outcomes: Vec<PageOutcome>) {
        for outcome in outcomes {
            if !outcome.is_valid() {
                warn!(
                    "[任务 {}] 第 {} 页识别失败: {}",
                    ctx.job_index,
                    outcome.page_number,
                    truncate_text(outcome.error.as_deref().unwrap_or_default(), 120)
                );
                continue;
            }
            let page = outcome.page_number;
            if job.record_page(page, outcome.records.unwrap_or_default()) {
                debug!("[任务 {}] ✓ 第 {} 页完成", ctx.job_index, page);
            }
        }
    }

    async fn send_cancel(&self, ctx: &JobCtx) {
        info!("[任务 {}] 🛑 请求取消，通知远程服务", ctx.job_index);
        if let Err(e) = self.services.invoker.signal_cancel(&ctx.session_id).await {
            warn!("[任务 {}] ⚠️ 发送取消信号失败: {}", ctx.job_index, e);
        }
    }

    async fn export(&self, job: &mut ScanJob, ctx: &JobCtx) -> Result<(), ExportError> {
        let records = job.flattened_records();
        info!(
            "[任务 {}] 📄 导出 {} 条记录 ({})",
            ctx.job_index,
            records.len(),
            job.status().label()
        );
        match self.services.sink.export(&job.original_name, &records).await {
            Ok(()) => {
                job.exported = true;
                Ok(())
            }
            Err(e) => {
                error!("[任务 {}] ❌ 导出失败（额度不受影响）: {}", ctx.job_index, e);
                Err(e)
            }
        }
    }
}

// ========== 日志辅助函数 ==========

fn log_job_start(ctx: &JobCtx, job: &ScanJob, required: u32) {
    info!("\n[任务 {}] {}", ctx.job_index, "─".repeat(30));
    info!("[任务 {}] 开始处理: {}", ctx.job_index, job.original_name);
    info!(
        "[任务 {}] 总页数 {}，本次扫描 {} 页",
        ctx.job_index, job.total_pages, required
    );
}

fn log_job_complete(ctx: &JobCtx, report: &JobReport) {
    let icon = match report.status {
        JobStatus::Done => "✅",
        JobStatus::Cancelled => "⏹️",
        _ => "❌",
    };
    info!(
        "[任务 {}] {} {}: {}",
        ctx.job_index,
        icon,
        report.status.label(),
        report.summary()
    );
}
