//! 批量扫描控制器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责把扫描队列逐个执行完，是整个系统的"指挥中心"。
//!
//! ## 核心功能
//!
//! 1. **顺序执行**：同一时间只有一个任务在扫描，按入队顺序完成
//! 2. **队列增长**：队列暂时为空时等待追加通知，确认没有新任务才结束
//! 3. **取消**：持有本次运行的取消令牌，取消后不再开始新任务
//! 4. **额度决策**：扣费失败时暂停，由操作员选择重试或中止
//! 5. **导出策略**：逐个导出，或全部完成后合并导出
//! 6. **状态快照**：通过 `watch` 通道向展示层发布只读快照
//!
//! ## 状态机
//!
//! ```text
//! Idle → Running → { Success, CancelledFinal, Error }
//! ```
//!
//! 终止状态只针对本次运行，队列本身保留到下次运行。

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ExportMode};
use crate::error::ScanError;
use crate::models::{JobId, JobStatus, JobView, ScanJob, ScanQueue};
use crate::orchestrator::operator::{OperatorDecision, OperatorPrompt};
use crate::orchestrator::report::{JobReport, RunOutcome, RunReport};
use crate::services::{ExportBatch, FailureLog};
use crate::workflow::{JobOutcome, JobRunner, JobServices};

/// 控制器运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Success,
    CancelledFinal,
    Error,
}

impl From<RunOutcome> for RunState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => RunState::Success,
            RunOutcome::Cancelled => RunState::CancelledFinal,
            RunOutcome::Error => RunState::Error,
        }
    }
}

/// 控制器的只读快照
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub state: RunState,
    /// 正在执行的任务
    pub current: Option<JobView>,
    /// 可见任务列表（不含正在执行的任务）
    pub jobs: Vec<JobView>,
    /// 账本最近返回的余额
    pub balance: Option<i64>,
    /// 等待操作员决定的任务
    pub awaiting_decision: Option<JobId>,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self {
            state: RunState::Idle,
            current: None,
            jobs: Vec::new(),
            balance: None,
            awaiting_decision: None,
        }
    }
}

/// 批量扫描控制器
pub struct BatchController {
    queue: ScanQueue,
    runner: JobRunner,
    prompt: Arc<dyn OperatorPrompt>,
    failure_log: Option<FailureLog>,
    queue_grace: Duration,
    token: Mutex<CancellationToken>,
    snapshot: watch::Sender<ControllerSnapshot>,
    run_lock: tokio::sync::Mutex<()>,
}

impl BatchController {
    /// 创建控制器
    pub fn new(
        queue: ScanQueue,
        services: JobServices,
        prompt: Arc<dyn OperatorPrompt>,
        config: &Config,
    ) -> Self {
        let (snapshot, _) = watch::channel(ControllerSnapshot {
            jobs: queue.visible_jobs(),
            ..ControllerSnapshot::default()
        });
        Self {
            queue,
            runner: JobRunner::new(services, config),
            prompt,
            failure_log: None,
            queue_grace: config.queue_grace(),
            token: Mutex::new(CancellationToken::new()),
            snapshot,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 记录失败 / 取消的任务
    pub fn with_failure_log(mut self, failure_log: FailureLog) -> Self {
        self.failure_log = Some(failure_log);
        self
    }

    pub fn queue(&self) -> &ScanQueue {
        &self.queue
    }

    /// 追加任务（运行期间也可以调用）
    pub fn enqueue(&self, job: ScanJob) -> JobId {
        let id = self.queue.push(job);
        self.publish(|_| {});
        id
    }

    /// 订阅状态快照
    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// 取消本次运行：不再开始新任务，正在执行的任务通知远程服务停止
    pub fn cancel(&self) {
        info!("🛑 收到取消请求");
        self.token.lock().cancel();
    }

    /// 本次运行的取消令牌
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.lock().clone()
    }

    /// 执行一次运行，直到队列排空、被取消或中止
    pub async fn run(&self) -> RunReport {
        let _exclusive = self.run_lock.lock().await;

        let token = CancellationToken::new();
        *self.token.lock() = token.clone();
        self.publish(|s| {
            s.state = RunState::Running;
            s.current = None;
            s.awaiting_decision = None;
        });
        info!("▶️ 开始运行，待处理任务 {} 个", self.queue.pending_count());

        let export_mode = self.runner.export_mode();
        let mut reports: Vec<JobReport> = Vec::new();
        let mut combined: Vec<JobId> = Vec::new();
        let mut balance = self.snapshot.borrow().balance;
        let mut credits_ambiguous = false;
        let mut job_index = 0;

        let mut outcome = loop {
            if token.is_cancelled() {
                break RunOutcome::Cancelled;
            }

            let since = self.queue.generation();
            let Some(id) = self.queue.next_pending() else {
                debug!("队列暂时为空，等待新任务...");
                let grew = tokio::select! {
                    grew = self.queue.wait_for_growth(since, self.queue_grace) => grew,
                    _ = token.cancelled() => false,
                };
                if grew {
                    continue;
                }
                break if token.is_cancelled() {
                    RunOutcome::Cancelled
                } else {
                    RunOutcome::Success
                };
            };

            let Some(mut job) = self.queue.checkout(id) else {
                continue;
            };
            job_index += 1;

            let result = self.run_with_decision(&mut job, job_index, &token).await;

            let rejected = JobReport::from_job(&job, 0);
            let has_records = job.has_records();
            self.queue.checkin(job);

            match result {
                Ok(JobOutcome {
                    report,
                    failure,
                    export_error,
                    balance: latest,
                }) => {
                    balance = latest.or(balance);
                    if report.refund_outstanding > 0 {
                        credits_ambiguous = true;
                    }
                    if let Some(e) = export_error {
                        warn!("[任务 {}] 导出失败已记录: {}", job_index, e);
                    }
                    match report.status {
                        JobStatus::Error => {
                            if let Some(failure) = &failure {
                                warn!("[任务 {}] ❌ {}，已全额退款，继续下一个任务", job_index, failure);
                            }
                            self.queue.hide(id);
                            self.log_failure(&report).await;
                        }
                        JobStatus::Cancelled => self.log_failure(&report).await,
                        _ => {}
                    }
                    if export_mode == ExportMode::Combine && has_records {
                        combined.push(id);
                    }
                    reports.push(report);
                }
                Err(e) if e.leaves_job_pending() => {
                    warn!("[任务 {}] 已中止，任务保留到下次运行: {}", job_index, e);
                }
                Err(e) => {
                    warn!("[任务 {}] ❌ 任务被拒绝: {}", job_index, e);
                    self.queue.hide(id);
                    self.log_failure(&rejected).await;
                    reports.push(rejected);
                }
            }

            self.publish(|s| {
                s.current = None;
                s.balance = balance;
            });
        };

        if !combined.is_empty() {
            let exported = if outcome == RunOutcome::Success {
                self.export_combined(&combined).await
            } else {
                // 运行被取消时不做合并导出，逐个导出保留部分结果
                self.export_each(&combined).await
            };
            if exported.len() < combined.len() && outcome == RunOutcome::Success {
                outcome = RunOutcome::Error;
            }
            for report in reports.iter_mut().filter(|r| exported.contains(&r.id)) {
                report.exported = true;
            }
        }

        if credits_ambiguous {
            error!("⚠️ 存在退款失败的任务，需要人工核对额度");
            outcome = RunOutcome::Error;
        }

        let pending_jobs = self.queue.pending_count();
        self.publish(|s| {
            s.state = outcome.into();
            s.current = None;
            s.balance = balance;
        });
        info!("⏹️ 运行结束: {:?}，{} 个任务等待下次运行", outcome, pending_jobs);

        RunReport {
            outcome,
            jobs: reports,
            balance,
            pending_jobs,
        }
    }

    /// 执行任务；扣费失败时等待操作员决定，重试时仍是同一个任务
    async fn run_with_decision(
        &self,
        job: &mut ScanJob,
        job_index: usize,
        token: &CancellationToken,
    ) -> Result<JobOutcome, ScanError> {
        let mut observe = |job: &ScanJob| {
            let view = job.view();
            self.publish(|s| s.current = Some(view));
        };

        loop {
            match self.runner.run(job, job_index, token, &mut observe).await {
                Err(e) if e.needs_operator() => {
                    self.publish(|s| s.awaiting_decision = Some(job.id));
                    let decision = self.prompt.decide(&job.view(), &e).await;
                    self.publish(|s| s.awaiting_decision = None);

                    match decision {
                        OperatorDecision::Retry if token.is_cancelled() => {
                            warn!("[任务 {}] 等待决定期间运行已取消，不再重试", job_index);
                            return Err(e);
                        }
                        OperatorDecision::Retry => {
                            info!("[任务 {}] 🔁 操作员选择重试", job_index);
                        }
                        OperatorDecision::Abort => {
                            warn!("[任务 {}] ⏹️ 操作员选择中止", job_index);
                            token.cancel();
                            return Err(e);
                        }
                    }
                }
                other => return other,
            }
        }
    }

    fn export_batch(&self, id: JobId) -> Option<ExportBatch> {
        self.queue.get(id).map(|job| ExportBatch {
            source_file: job.original_name.clone(),
            records: job.flattened_records(),
        })
    }

    /// 合并导出，返回成功导出的任务
    async fn export_combined(&self, ids: &[JobId]) -> Vec<JobId> {
        let batches: Vec<ExportBatch> = ids.iter().filter_map(|id| self.export_batch(*id)).collect();
        info!("📄 合并导出 {} 个文件", batches.len());

        match self.runner.services().sink.export_combined(&batches).await {
            Ok(()) => {
                self.mark_exported(ids);
                ids.to_vec()
            }
            Err(e) => {
                error!("❌ 合并导出失败（额度不受影响）: {}", e);
                Vec::new()
            }
        }
    }

    /// 逐个导出，返回成功导出的任务
    async fn export_each(&self, ids: &[JobId]) -> Vec<JobId> {
        let mut exported = Vec::new();
        for id in ids {
            let Some(batch) = self.export_batch(*id) else {
                continue;
            };
            match self
                .runner
                .services()
                .sink
                .export(&batch.source_file, &batch.records)
                .await
            {
                Ok(()) => exported.push(*id),
                Err(e) => error!("❌ 导出 {} 失败: {}", batch.source_file, e),
            }
        }
        self.mark_exported(&exported);
        exported
    }

    fn mark_exported(&self, ids: &[JobId]) {
        for id in ids {
            self.queue.update(*id, |job| job.exported = true);
        }
        self.publish(|_| {});
    }

    async fn log_failure(&self, report: &JobReport) {
        if let Some(log) = &self.failure_log {
            if let Err(e) = log.write(report).await {
                warn!("写入失败记录 {} 失败: {}", log.path(), e);
            }
        }
    }

    fn publish(&self, f: impl FnOnce(&mut ControllerSnapshot)) {
        let jobs = self.queue.visible_jobs();
        self.snapshot.send_modify(|s| {
            f(s);
            s.jobs = jobs;
        });
    }
}
