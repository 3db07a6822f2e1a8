//! 测试用的内存实现
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use scan_batch::clients::{
    CreditLedgerClient, LedgerReceipt, PageOutcome, ProgressHub, ProgressUpdate,
    RemoteScanInvoker, ScanResponse,
};
use scan_batch::error::{ExportError, LedgerError, RemoteError, ScanError};
use scan_batch::models::{
    DocumentHandle, ExtractedRecord, JobView, PageSelectionRequest, ScanJob, SessionId,
};
use scan_batch::orchestrator::{OperatorDecision, OperatorPrompt};
use scan_batch::services::{ExportBatch, ExportSink};
use scan_batch::workflow::JobServices;
use scan_batch::{Config, ExportMode};

pub fn record(page: u32) -> ExtractedRecord {
    let mut r = ExtractedRecord::new();
    r.insert("value".into(), json!(format!("v{}", page)));
    r
}

pub fn job(name: &str, total_pages: u32, selection: PageSelectionRequest) -> ScanJob {
    ScanJob::new(DocumentHandle::new(name), name, total_pages, selection).unwrap()
}

// ========== 额度账本 ==========

#[derive(Default)]
pub struct LedgerState {
    pub balance: i64,
    pub deducts: Vec<u32>,
    pub refunds: Vec<u32>,
    pub failed_deducts: usize,
    /// 接下来若干次扣费失败
    pub fail_next_deducts: usize,
    pub fail_refunds: bool,
}

pub struct FakeLedger {
    pub state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn with_balance(balance: i64) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                balance,
                ..LedgerState::default()
            }),
        }
    }

    pub fn deducts(&self) -> Vec<u32> {
        self.state.lock().deducts.clone()
    }

    pub fn refunds(&self) -> Vec<u32> {
        self.state.lock().refunds.clone()
    }

    pub fn balance(&self) -> i64 {
        self.state.lock().balance
    }
}

#[async_trait]
impl CreditLedgerClient for FakeLedger {
    async fn deduct(&self, _user_id: &str, pages: u32) -> Result<LedgerReceipt, LedgerError> {
        let mut state = self.state.lock();
        if state.fail_next_deducts > 0 {
            state.fail_next_deducts -= 1;
            state.failed_deducts += 1;
            return Err(LedgerError::InsufficientCredits {
                requested: pages,
                balance: Some(state.balance),
            });
        }
        if state.balance < pages as i64 {
            state.failed_deducts += 1;
            return Err(LedgerError::InsufficientCredits {
                requested: pages,
                balance: Some(state.balance),
            });
        }
        state.balance -= pages as i64;
        state.deducts.push(pages);
        Ok(LedgerReceipt {
            pages,
            new_balance: state.balance,
        })
    }

    async fn refund(&self, _user_id: &str, pages: u32) -> Result<LedgerReceipt, LedgerError> {
        let mut state = self.state.lock();
        if state.fail_refunds {
            return Err(LedgerError::Rejected("ledger offline".into()));
        }
        state.balance += pages as i64;
        state.refunds.push(pages);
        Ok(LedgerReceipt {
            pages,
            new_balance: state.balance,
        })
    }
}

// ========== 识别服务 ==========

/// 每次提交的行为
#[derive(Debug, Clone)]
pub enum Behavior {
    /// 所有请求页都返回一条记录
    Complete,
    /// 只返回列出的页
    Partial(Vec<u32>),
    /// 列出的页通过进度推送送达，最终返回中不带页
    ProgressOnly(Vec<u32>),
    /// 传输失败
    Fail(String),
    /// 列出的页通过进度推送送达，随后最终返回失败
    ProgressThenFail(Vec<u32>, String),
    /// 先推送 `done` 的进度，然后等待取消信号再返回
    ProgressThenWaitForCancel(Vec<u32>),
}

pub struct ScriptedInvoker {
    hub: Arc<ProgressHub>,
    behaviors: Mutex<VecDeque<Behavior>>,
    pub submits: Mutex<Vec<(String, Vec<u32>)>>,
    pub cancels: Mutex<Vec<SessionId>>,
    /// 进度已推送，等待取消
    pub reached: Notify,
    cancel_signal: Notify,
}

impl ScriptedInvoker {
    pub fn new(hub: Arc<ProgressHub>) -> Self {
        Self {
            hub,
            behaviors: Mutex::new(VecDeque::new()),
            submits: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            reached: Notify::new(),
            cancel_signal: Notify::new(),
        }
    }

    pub fn script(&self, behavior: Behavior) {
        self.behaviors.lock().push_back(behavior);
    }

    pub fn submitted_files(&self) -> Vec<String> {
        self.submits.lock().iter().map(|(f, _)| f.clone()).collect()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.lock().len()
    }

    fn publish(&self, session_id: &SessionId, pages: &[u32], total: usize) {
        for (i, page) in pages.iter().enumerate() {
            let update = ProgressUpdate {
                percentage: ((i + 1) as f32 / total.max(1) as f32) * 100.0,
                message: format!("page {} done", page),
                page_results: vec![PageOutcome::ok(*page, vec![record(*page)])],
            };
            assert!(self.hub.publish(session_id, update), "runner must be subscribed");
        }
    }
}

fn outcomes(pages: &[u32]) -> Vec<PageOutcome> {
    pages
        .iter()
        .map(|p| PageOutcome::ok(*p, vec![record(*p)]))
        .collect()
}

#[async_trait]
impl RemoteScanInvoker for ScriptedInvoker {
    async fn submit(
        &self,
        file: &DocumentHandle,
        pages: &[u32],
        session_id: &SessionId,
    ) -> Result<ScanResponse, RemoteError> {
        self.submits.lock().push((file.file_name(), pages.to_vec()));
        let behavior = self
            .behaviors
            .lock()
            .pop_front()
            .unwrap_or(Behavior::Complete);

        match behavior {
            Behavior::Complete => Ok(ScanResponse {
                success: true,
                pages: outcomes(pages),
            }),
            Behavior::Partial(done) => {
                let mut result = outcomes(&done);
                result.extend(
                    pages
                        .iter()
                        .filter(|p| !done.contains(p))
                        .map(|p| PageOutcome::failed(*p, "unreadable")),
                );
                Ok(ScanResponse {
                    success: false,
                    pages: result,
                })
            }
            Behavior::ProgressOnly(done) => {
                self.publish(session_id, &done, pages.len());
                // 让执行者有机会先读取推送
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(ScanResponse {
                    success: true,
                    pages: Vec::new(),
                })
            }
            Behavior::Fail(message) => Err(RemoteError::Failed(message)),
            Behavior::ProgressThenFail(done, message) => {
                self.publish(session_id, &done, pages.len());
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(RemoteError::Failed(message))
            }
            Behavior::ProgressThenWaitForCancel(done) => {
                self.publish(session_id, &done, pages.len());
                self.reached.notify_one();
                self.cancel_signal.notified().await;
                Ok(ScanResponse {
                    success: false,
                    pages: Vec::new(),
                })
            }
        }
    }

    async fn signal_cancel(&self, session_id: &SessionId) -> Result<(), RemoteError> {
        self.cancels.lock().push(*session_id);
        self.cancel_signal.notify_one();
        Ok(())
    }
}

// ========== 导出端 ==========

#[derive(Default)]
pub struct MemorySink {
    pub exports: Mutex<Vec<(String, Vec<(u32, ExtractedRecord)>)>>,
    pub combined: Mutex<Vec<Vec<ExportBatch>>>,
    pub fail: Mutex<bool>,
}

impl MemorySink {
    pub fn exported_files(&self) -> Vec<String> {
        self.exports.lock().iter().map(|(f, _)| f.clone()).collect()
    }

    pub fn exported_pages(&self, file: &str) -> Vec<u32> {
        self.exports
            .lock()
            .iter()
            .filter(|(f, _)| f == file)
            .flat_map(|(_, records)| records.iter().map(|(p, _)| *p))
            .collect()
    }
}

#[async_trait]
impl ExportSink for MemorySink {
    async fn export(
        &self,
        filename: &str,
        records: &[(u32, ExtractedRecord)],
    ) -> Result<(), ExportError> {
        if *self.fail.lock() {
            return Err(ExportError::Empty(format!("sink offline: {}", filename)));
        }
        self.exports
            .lock()
            .push((filename.to_string(), records.to_vec()));
        Ok(())
    }

    async fn export_combined(&self, batches: &[ExportBatch]) -> Result<(), ExportError> {
        if *self.fail.lock() {
            return Err(ExportError::Empty("sink offline".into()));
        }
        self.combined.lock().push(batches.to_vec());
        Ok(())
    }
}

// ========== 操作员 ==========

#[derive(Default)]
pub struct ScriptedPrompt {
    decisions: Mutex<VecDeque<OperatorDecision>>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(decisions: impl IntoIterator<Item = OperatorDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked_count(&self) -> usize {
        self.asked.lock().len()
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedPrompt {
    async fn decide(&self, job: &JobView, _error: &ScanError) -> OperatorDecision {
        self.asked.lock().push(job.original_name.clone());
        self.decisions
            .lock()
            .pop_front()
            .unwrap_or(OperatorDecision::Abort)
    }
}

// ========== 组装 ==========

pub struct Harness {
    pub ledger: Arc<FakeLedger>,
    pub hub: Arc<ProgressHub>,
    pub invoker: Arc<ScriptedInvoker>,
    pub sink: Arc<MemorySink>,
}

impl Harness {
    pub fn new(balance: i64) -> Self {
        let hub = Arc::new(ProgressHub::new());
        Self {
            ledger: Arc::new(FakeLedger::with_balance(balance)),
            invoker: Arc::new(ScriptedInvoker::new(hub.clone())),
            hub,
            sink: Arc::new(MemorySink::default()),
        }
    }

    pub fn services(&self) -> JobServices {
        JobServices {
            ledger: self.ledger.clone(),
            invoker: self.invoker.clone(),
            progress: self.hub.clone(),
            sink: self.sink.clone(),
        }
    }

    pub fn config(&self, export_mode: ExportMode) -> Config {
        Config {
            export_mode,
            queue_grace_ms: 50,
            ..Config::default()
        }
    }
}
