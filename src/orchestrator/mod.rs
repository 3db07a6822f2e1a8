//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责队列级别的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_controller` - 批量扫描控制器
//! - 按入队顺序逐个执行任务（不并发）
//! - 持有本次运行的取消令牌
//! - 扣费失败时暂停，交给操作员决定
//! - 逐个导出 / 合并导出
//! - 发布只读状态快照
//!
//! ### `operator` - 操作员决策点
//!
//! ### `report` - 任务与运行报告
//!
//! ## 层次关系
//!
//! ```text
//! batch_controller (处理 ScanQueue)
//!     ↓
//! workflow::JobRunner (处理单个 ScanJob)
//!     ↓
//! services (能力层：page_range / export / failure_log)
//!     ↓
//! clients (外部协作方：ledger / scan / progress)
//! ```

pub mod batch_controller;
pub mod operator;
pub mod report;

// 重新导出主要类型
pub use batch_controller::{BatchController, ControllerSnapshot, RunState};
pub use operator::{OperatorDecision, OperatorPrompt, StdinPrompt};
pub use report::{JobReport, RunOutcome, RunReport};
