//! 日志初始化
//!
//! 默认 `info` 级别，`RUST_LOG` 优先；`verbose` 为真时提升到 `debug`

use tracing_subscriber::EnvFilter;

/// 初始化日志（默认级别）
pub fn init() {
    init_with(false);
}

/// 初始化日志，可重复调用（测试中只有第一次生效）
pub fn init_with(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
