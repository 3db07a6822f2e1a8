//! 任务处理上下文
//!
//! 封装"我正在处理第几个任务、使用哪个会话"这一信息

use std::fmt::Display;

use crate::models::{JobId, SessionId};

/// 任务处理上下文
#[derive(Debug, Clone)]
pub struct JobCtx {
    /// 任务ID
    pub job_id: JobId,

    /// 本次运行中的序号（仅用于日志显示，从1开始）
    pub job_index: usize,

    /// 本次远程调用的会话ID
    pub session_id: SessionId,
}

impl JobCtx {
    /// 创建新的任务上下文，每次都生成新的会话ID
    pub fn new(job_id: JobId, job_index: usize) -> Self {
        Self {
            job_id,
            job_index,
            session_id: SessionId::new(),
        }
    }
}

impl Display for JobCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[任务 {} 会话 {}]", self.job_id, self.session_id)
    }
}
