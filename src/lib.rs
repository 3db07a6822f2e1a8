//! # Scan Batch
//!
//! 批量文档扫描任务控制器：把上传的文档和页码选择变成一串按页计费的任务，
//! 逐个提交给远程识别服务，在各种失败和取消路径下核对扣费与退款，
//! 并把完整或部分的结果交给导出端。
//!
//! ## 架构设计
//!
//! ### ① 外部协作方（Clients）
//! - `clients/` - 只定义接口并提供一个可用实现
//! - `CreditLedgerClient` - 扣除 / 退还额度
//! - `RemoteScanInvoker` - 提交识别、发送取消信号
//! - `ProgressChannel` - 按会话订阅进度推送
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个任务
//! - `page_range` - 页码范围解析
//! - `ExportSink` - 导出表格
//! - `FailureLog` - 写失败记录
//!
//! ### ③ 流程层（Workflow）
//! - `JobCtx` - 上下文封装（任务ID + 会话ID）
//! - `JobRunner` - 单个任务的完整流程（扣费 → 识别 → 核对 → 导出 / 退款）
//!
//! ### ④ 编排层（Orchestration）
//! - `BatchController` - 顺序执行队列，负责取消、额度决策和导出策略
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, ExportMode};
pub use error::{AppError, AppResult, ScanError};
pub use models::{JobId, JobStatus, PageSelection, PageSelectionRequest, ScanJob, ScanQueue};
pub use orchestrator::{BatchController, OperatorDecision, RunOutcome, RunReport, RunState};
pub use workflow::{JobCtx, JobRunner, JobServices};
