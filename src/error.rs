use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 扫描任务错误
    #[error("扫描错误: {0}")]
    Scan(#[from] ScanError),
    /// 额度账本错误
    #[error("额度错误: {0}")]
    Ledger(#[from] LedgerError),
    /// 远程识别服务错误
    #[error("远程服务错误: {0}")]
    Remote(#[from] RemoteError),
    /// 导出错误
    #[error("导出错误: {0}")]
    Export(#[from] ExportError),
    /// 任务清单错误
    #[error("清单错误: {0}")]
    Manifest(#[from] ManifestError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 单个扫描任务的错误
///
/// 控制器依据变体决定后续动作：
/// - `InvalidRange`：扣费前拒绝，任务直接失败
/// - `CreditDeduction`：暂停批次，等待操作员决定
/// - `IncompleteResult` / `RemoteInvocation`：全额退款，继续下一个任务
/// - `NotStarted`：运行已取消，任务未扣费，保持等待状态
#[derive(Debug, Error)]
pub enum ScanError {
    /// 页码选择无效
    #[error("页码范围无效 ({input}): {reason}")]
    InvalidRange { input: String, reason: String },

    /// 扣费失败，未产生任何费用
    #[error("扣除 {requested} 页额度失败: {source}")]
    CreditDeduction {
        requested: u32,
        #[source]
        source: LedgerError,
    },

    /// 远程服务返回的页数少于请求页数，且未请求取消
    #[error("结果不完整: 请求 {requested} 页，仅收到 {received} 页")]
    IncompleteResult { requested: u32, received: u32 },

    /// 远程调用本身失败（传输、超时等）
    #[error("远程调用失败: {0}")]
    RemoteInvocation(#[from] RemoteError),

    /// 扣费前发现运行已取消
    #[error("运行已取消，任务未开始")]
    NotStarted,
}

impl ScanError {
    /// 是否需要操作员决定（重试 / 中止）
    pub fn needs_operator(&self) -> bool {
        matches!(self, ScanError::CreditDeduction { .. })
    }

    /// 任务未产生任何费用，留在队列中等待下次运行
    pub fn leaves_job_pending(&self) -> bool {
        matches!(self, ScanError::CreditDeduction { .. } | ScanError::NotStarted)
    }
}

/// 额度账本错误
#[derive(Debug, Error)]
pub enum LedgerError {
    /// 余额不足
    #[error("余额不足: 需要 {requested}，剩余 {balance:?}")]
    InsufficientCredits { requested: u32, balance: Option<i64> },

    /// 请求失败
    #[error("账本请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 账本返回错误响应
    #[error("账本返回错误响应 ({endpoint}): status={status}, message={message:?}")]
    BadResponse {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },

    /// 账本拒绝（其他原因）
    #[error("账本拒绝: {0}")]
    Rejected(String),
}

/// 远程识别服务错误
#[derive(Debug, Error)]
pub enum RemoteError {
    /// 读取待上传文件失败
    #[error("读取文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 请求失败
    #[error("请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// 服务返回错误响应
    #[error("服务返回错误响应 ({endpoint}): status={status}, message={message:?}")]
    BadResponse {
        endpoint: String,
        status: u16,
        message: Option<String>,
    },

    /// 超时
    #[error("请求超时 ({0} 秒)")]
    Timeout(u64),

    /// 服务报告整体失败
    #[error("服务报告失败: {0}")]
    Failed(String),
}

/// 导出错误
#[derive(Debug, Error)]
pub enum ExportError {
    /// IO 错误
    #[error("写入导出文件失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV 序列化错误
    #[error("CSV 序列化失败: {0}")]
    Csv(#[from] csv::Error),

    /// 没有可导出的记录
    #[error("没有可导出的记录: {0}")]
    Empty(String),
}

/// 任务清单错误
#[derive(Debug, Error)]
pub enum ManifestError {
    /// 目录不存在
    #[error("目录不存在: {0}")]
    DirectoryNotFound(String),

    /// 读取失败
    #[error("读取清单失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML 解析失败
    #[error("TOML 解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// 总页数无效
    #[error("总页数必须大于 0 ({0})")]
    InvalidPageCount(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

// ========== 便捷构造函数 ==========

impl ScanError {
    /// 创建页码范围错误
    pub fn invalid_range(input: impl Into<String>, reason: impl Into<String>) -> Self {
        ScanError::InvalidRange {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

impl LedgerError {
    /// 创建账本请求失败错误
    pub fn request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        LedgerError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }
}

impl RemoteError {
    /// 创建远程请求失败错误
    pub fn request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RemoteError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }
}

impl ExportError {
    /// 创建导出 IO 错误
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        ExportError::Io {
            path: path.into(),
            source,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
