//! 操作员决策
//!
//! 扣费失败时批次暂停，必须由操作员明确选择重试或中止，不会被静默跳过。

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::error::ScanError;
use crate::models::JobView;

/// 操作员的选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorDecision {
    /// 对同一个任务重新扣费
    Retry,
    /// 取消本次运行，未开始的任务保留到下次
    Abort,
}

/// 决策点
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    async fn decide(&self, job: &JobView, error: &ScanError) -> OperatorDecision;
}

/// 从标准输入读取决策
///
/// 输入 `r` / `retry` 重试，其他输入或输入结束都视为中止
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl StdinPrompt {
    pub fn parse(line: &str) -> OperatorDecision {
        match line.trim().to_ascii_lowercase().as_str() {
            "r" | "retry" | "重试" => OperatorDecision::Retry,
            _ => OperatorDecision::Abort,
        }
    }
}

#[async_trait]
impl OperatorPrompt for StdinPrompt {
    async fn decide(&self, job: &JobView, error: &ScanError) -> OperatorDecision {
        let question = format!(
            "\n⚠️ 任务 {} ({}) 扣费失败: {}\n   [r] 重试  [a] 中止 > ",
            job.id, job.original_name, error
        );

        let mut stdout = tokio::io::stdout();
        if stdout.write_all(question.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            warn!("无法写入标准输出，默认中止");
            return OperatorDecision::Abort;
        }

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => OperatorDecision::Abort,
            Ok(_) => Self::parse(&line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operator_input() {
        assert_eq!(StdinPrompt::parse(" R \n"), OperatorDecision::Retry);
        assert_eq!(StdinPrompt::parse("retry"), OperatorDecision::Retry);
        assert_eq!(StdinPrompt::parse("a"), OperatorDecision::Abort);
        assert_eq!(StdinPrompt::parse(""), OperatorDecision::Abort);
    }
}
