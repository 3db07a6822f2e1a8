use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// 导出策略
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportMode {
    /// 每个任务完成后单独导出
    Separate,
    /// 整个队列完成后合并导出一次
    Combine,
}

impl FromStr for ExportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "separate" => Ok(ExportMode::Separate),
            "combine" | "combined" => Ok(ExportMode::Combine),
            other => Err(ConfigError::EnvVarParseFailed {
                var_name: "EXPORT_MODE".to_string(),
                value: other.to_string(),
                expected_type: "separate | combine".to_string(),
            }),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 扣费 / 退款使用的用户ID
    pub user_id: String,
    // --- 额度账本 ---
    pub ledger_api_base_url: String,
    pub ledger_api_token: String,
    // --- 识别服务 ---
    pub scan_api_base_url: String,
    pub scan_api_token: String,
    /// 单次识别请求超时（秒）
    pub scan_timeout_secs: u64,
    /// 任务清单目录
    pub jobs_folder: String,
    /// 导出目录
    pub export_folder: String,
    /// 导出策略
    pub export_mode: ExportMode,
    /// 队列排空后等待新任务的时间（毫秒）
    pub queue_grace_ms: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 失败任务记录文件
    pub failure_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: "local-operator".to_string(),
            ledger_api_base_url: "http://127.0.0.1:8700".to_string(),
            ledger_api_token: String::new(),
            scan_api_base_url: "http://127.0.0.1:8800".to_string(),
            scan_api_token: String::new(),
            scan_timeout_secs: 900,
            jobs_folder: "jobs".to_string(),
            export_folder: "exports".to_string(),
            export_mode: ExportMode::Separate,
            queue_grace_ms: 1500,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            failure_log_file: "failed_jobs.txt".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            user_id: std::env::var("SCAN_USER_ID").unwrap_or(default.user_id),
            ledger_api_base_url: std::env::var("LEDGER_API_BASE_URL").unwrap_or(default.ledger_api_base_url),
            ledger_api_token: std::env::var("LEDGER_API_TOKEN").unwrap_or(default.ledger_api_token),
            scan_api_base_url: std::env::var("SCAN_API_BASE_URL").unwrap_or(default.scan_api_base_url),
            scan_api_token: std::env::var("SCAN_API_TOKEN").unwrap_or(default.scan_api_token),
            scan_timeout_secs: std::env::var("SCAN_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.scan_timeout_secs),
            jobs_folder: std::env::var("JOBS_FOLDER").unwrap_or(default.jobs_folder),
            export_folder: std::env::var("EXPORT_FOLDER").unwrap_or(default.export_folder),
            export_mode: std::env::var("EXPORT_MODE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.export_mode),
            queue_grace_ms: std::env::var("QUEUE_GRACE_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.queue_grace_ms),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            failure_log_file: std::env::var("FAILURE_LOG_FILE").unwrap_or(default.failure_log_file),
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn queue_grace(&self) -> Duration {
        Duration::from_millis(self.queue_grace_ms)
    }
}
