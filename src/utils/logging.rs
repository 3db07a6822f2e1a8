use anyhow::Result;
/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use std::fs;
use tracing::{info, warn};

use crate::config::ExportMode;
use crate::orchestrator::report::{RunOutcome, RunReport};
use crate::models::JobStatus;

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n批量扫描日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(export_mode: ExportMode) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 顺序扫描模式");
    info!(
        "📊 导出方式: {}",
        match export_mode {
            ExportMode::Separate => "逐个导出",
            ExportMode::Combine => "合并导出",
        }
    );
    info!("{}", "=".repeat(60));
}

/// 记录任务加载信息
///
/// # 参数
/// - `total`: 任务总数
/// - `total_pages`: 计划扫描的总页数（按全部页估算）
pub fn log_jobs_loaded(total: usize, total_pages: u32) {
    info!("✓ 找到 {} 个待扫描的文档", total);
    info!("📋 最多消耗 {} 页额度", total_pages);
    info!("💡 任务逐个执行，运行期间可以继续追加\n");
}

/// 打印最终统计信息
///
/// # 参数
/// - `report`: 运行报告
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(report: &RunReport, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 完成: {}", report.count(JobStatus::Done));
    info!("⏹️ 取消: {}", report.count(JobStatus::Cancelled));
    info!("❌ 失败: {}", report.count(JobStatus::Error));
    info!("⏳ 待下次运行: {}", report.pending_jobs);
    info!(
        "💳 计费 {} 页 | 退还 {} 页 | 余额 {}",
        report.total_charged(),
        report.total_refunded(),
        report
            .balance
            .map(|b| b.to_string())
            .unwrap_or_else(|| "未知".to_string())
    );
    for job in &report.jobs {
        info!("  {} {} — {}", job.id, job.original_name, job.summary());
    }
    match report.outcome {
        RunOutcome::Success => info!("🎉 队列已全部处理"),
        RunOutcome::Cancelled => warn!("⏹️ 本次运行已取消"),
        RunOutcome::Error => warn!("⚠️ 本次运行存在需要人工核对的额度或导出问题"),
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
