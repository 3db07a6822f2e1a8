use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use scan_batch::clients::{HttpCreditLedger, HttpScanInvoker, ProgressHub};
use scan_batch::config::Config;
use scan_batch::models::load_all_manifests;
use scan_batch::orchestrator::{BatchController, RunOutcome, StdinPrompt};
use scan_batch::services::{CsvExportSink, FailureLog};
use scan_batch::utils::logging;
use scan_batch::workflow::JobServices;
use scan_batch::{logger, AppResult, ScanQueue};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logger::init_with(config.verbose_logging);
    logging::init_log_file(&config.output_log_file)
        .with_context(|| format!("无法创建日志文件: {}", config.output_log_file))?;
    logging::log_startup(config.export_mode);

    // 加载任务清单
    info!("\n📁 正在扫描任务清单...");
    let queue = load_queue(&config.jobs_folder)
        .await
        .with_context(|| format!("无法加载任务清单: {}", config.jobs_folder))?;

    if queue.is_empty() {
        warn!("⚠️ 没有找到待处理的任务清单，程序结束");
        return Ok(());
    }

    let services = JobServices {
        ledger: Arc::new(HttpCreditLedger::new(&config)),
        invoker: Arc::new(HttpScanInvoker::new(&config)),
        progress: Arc::new(ProgressHub::new()),
        sink: Arc::new(CsvExportSink::new(&config.export_folder)),
    };

    let controller = Arc::new(
        BatchController::new(queue, services, Arc::new(StdinPrompt), &config)
            .with_failure_log(FailureLog::with_path(&config.failure_log_file)),
    );

    // Ctrl-C 请求取消：当前任务收尾后停止
    let cancel_handle = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_handle.cancel();
        }
    });

    let report = controller.run().await;
    logging::print_final_stats(&report, &config.output_log_file);

    if report.outcome == RunOutcome::Error {
        anyhow::bail!("运行结束但存在需要人工核对的问题");
    }

    Ok(())
}

/// 加载清单目录中的所有任务并入队
async fn load_queue(jobs_folder: &str) -> AppResult<ScanQueue> {
    let manifests = load_all_manifests(jobs_folder).await?;
    let queue = ScanQueue::new();
    if manifests.is_empty() {
        return Ok(queue);
    }

    let total_pages: u32 = manifests.iter().map(|m| m.total_pages).sum();
    logging::log_jobs_loaded(manifests.len(), total_pages);
    for manifest in manifests {
        let file = manifest.file.display().to_string();
        match manifest.into_job() {
            Ok(job) => {
                queue.push(job);
            }
            Err(e) => warn!("⚠️ 跳过清单 {}: {}", file, e),
        }
    }
    Ok(queue)
}
