//! 进度推送通道
//!
//! 单向实时推送，按会话ID订阅。`ProgressHub` 是进程内实现：
//! 接收远程推送的传输层（或测试）调用 `publish`，订阅者通过
//! `ProgressSubscription::next` 读取。

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::clients::scan_client::PageOutcome;
use crate::models::SessionId;

const SUBSCRIPTION_BUFFER: usize = 256;

/// 一次进度推送
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub percentage: f32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub page_results: Vec<PageOutcome>,
}

/// 一个会话的进度订阅
#[derive(Debug)]
pub struct ProgressSubscription {
    session_id: SessionId,
    receiver: mpsc::Receiver<ProgressUpdate>,
}

impl ProgressSubscription {
    pub fn new(session_id: SessionId, receiver: mpsc::Receiver<ProgressUpdate>) -> Self {
        Self {
            session_id,
            receiver,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// 下一条推送；通道关闭后返回 `None`
    pub async fn next(&mut self) -> Option<ProgressUpdate> {
        self.receiver.recv().await
    }

    /// 取出已经到达、尚未读取的推送
    pub fn drain(&mut self) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.receiver.try_recv() {
            updates.push(update);
        }
        updates
    }
}

/// 进度通道
pub trait ProgressChannel: Send + Sync {
    fn subscribe(&self, session_id: &SessionId) -> ProgressSubscription;

    fn unsubscribe(&self, session_id: &SessionId);
}

/// 进程内进度通道
#[derive(Default)]
pub struct ProgressHub {
    senders: Mutex<HashMap<SessionId, mpsc::Sender<ProgressUpdate>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 推送一条进度；没有订阅者或订阅者已满时返回 `false`
    pub fn publish(&self, session_id: &SessionId, update: ProgressUpdate) -> bool {
        let senders = self.senders.lock();
        match senders.get(session_id) {
            Some(sender) => sender.try_send(update).is_ok(),
            None => {
                debug!("会话 {} 没有订阅者，丢弃进度推送", session_id);
                false
            }
        }
    }

    pub fn is_subscribed(&self, session_id: &SessionId) -> bool {
        self.senders.lock().contains_key(session_id)
    }

    /// 当前订阅的会话
    pub fn sessions(&self) -> Vec<SessionId> {
        self.senders.lock().keys().copied().collect()
    }
}

impl ProgressChannel for ProgressHub {
    fn subscribe(&self, session_id: &SessionId) -> ProgressSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.senders.lock().insert(*session_id, tx);
        debug!("订阅进度: 会话 {}", session_id);
        ProgressSubscription::new(*session_id, rx)
    }

    fn unsubscribe(&self, session_id: &SessionId) {
        if self.senders.lock().remove(session_id).is_some() {
            debug!("取消订阅进度: 会话 {}", session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_only_to_matching_session() {
        let hub = ProgressHub::new();
        let a = SessionId::new();
        let b = SessionId::new();
        let mut sub = hub.subscribe(&a);

        assert!(hub.publish(&a, ProgressUpdate { percentage: 50.0, ..Default::default() }));
        assert!(!hub.publish(&b, ProgressUpdate::default()));

        let update = sub.next().await.unwrap();
        assert_eq!(update.percentage, 50.0);
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_stream() {
        let hub = ProgressHub::new();
        let session = SessionId::new();
        let mut sub = hub.subscribe(&session);
        hub.publish(&session, ProgressUpdate::default());
        hub.unsubscribe(&session);

        assert!(!hub.is_subscribed(&session));
        assert_eq!(sub.drain().len(), 1);
        assert!(sub.next().await.is_none());
    }
}
