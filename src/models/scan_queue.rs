//! 扫描队列
//!
//! 先进先出；运行期间允许追加，只允许移除从未开始的任务。
//! 已开始的任务不会从结构上移除，只能从可见列表中隐藏。
//!
//! 追加任务会通过 `Notify` 唤醒等待中的控制器，不需要轮询。

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::models::scan_job::{JobId, JobStatus, JobView, ScanJob};

struct Slot {
    id: JobId,
    visible: bool,
    /// 被 `JobRunner` 取走期间为 `None`
    job: Option<ScanJob>,
}

#[derive(Default)]
struct QueueState {
    slots: Vec<Slot>,
    next_id: u64,
    generation: u64,
}

#[derive(Default)]
struct QueueInner {
    state: Mutex<QueueState>,
    appended: Notify,
}

/// 扫描队列（可克隆的共享句柄）
#[derive(Clone, Default)]
pub struct ScanQueue {
    inner: Arc<QueueInner>,
}

impl ScanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加任务，返回分配的任务ID
    pub fn push(&self, mut job: ScanJob) -> JobId {
        let id = {
            let mut state = self.inner.state.lock();
            state.next_id += 1;
            let id = JobId(state.next_id);
            job.id = id;
            state.slots.push(Slot {
                id,
                visible: true,
                job: Some(job),
            });
            state.generation += 1;
            id
        };
        self.inner.appended.notify_waiters();
        id
    }

    /// 移除尚未开始的任务
    ///
    /// 已扣费、扫描中或已结束的任务不能移除，返回 `None`
    pub fn remove_pending(&self, id: JobId) -> Option<ScanJob> {
        let mut state = self.inner.state.lock();
        let idx = state.slots.iter().position(|slot| {
            slot.id == id
                && slot.job.as_ref().is_some_and(|job| {
                    job.status() == JobStatus::Pending && job.credits.deducted == 0
                })
        })?;
        state.slots.remove(idx).job
    }

    /// 第一个等待中的任务（FIFO）
    pub fn next_pending(&self) -> Option<JobId> {
        let state = self.inner.state.lock();
        state
            .slots
            .iter()
            .find(|slot| {
                slot.job
                    .as_ref()
                    .is_some_and(|job| job.status() == JobStatus::Pending)
            })
            .map(|slot| slot.id)
    }

    /// 取出任务交给执行者；执行期间队列中只保留占位
    pub fn checkout(&self, id: JobId) -> Option<ScanJob> {
        let mut state = self.inner.state.lock();
        state
            .slots
            .iter_mut()
            .find(|slot| slot.id == id)
            .and_then(|slot| slot.job.take())
    }

    /// 归还执行完的任务
    pub fn checkin(&self, job: ScanJob) {
        let mut state = self.inner.state.lock();
        if let Some(slot) = state.slots.iter_mut().find(|slot| slot.id == job.id) {
            slot.job = Some(job);
        }
    }

    /// 从可见列表中隐藏（任务仍保留在队列结构中）
    pub fn hide(&self, id: JobId) {
        let mut state = self.inner.state.lock();
        if let Some(slot) = state.slots.iter_mut().find(|slot| slot.id == id) {
            slot.visible = false;
        }
    }

    /// 修改队列中的任务（执行中的任务不可修改）
    pub(crate) fn update(&self, id: JobId, f: impl FnOnce(&mut ScanJob)) -> bool {
        let mut state = self.inner.state.lock();
        match state
            .slots
            .iter_mut()
            .find(|slot| slot.id == id)
            .and_then(|slot| slot.job.as_mut())
        {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// 获取任务副本
    pub fn get(&self, id: JobId) -> Option<ScanJob> {
        let state = self.inner.state.lock();
        state
            .slots
            .iter()
            .find(|slot| slot.id == id)
            .and_then(|slot| slot.job.clone())
    }

    /// 可见任务的只读视图（执行中的任务不在其中）
    pub fn visible_jobs(&self) -> Vec<JobView> {
        let state = self.inner.state.lock();
        state
            .slots
            .iter()
            .filter(|slot| slot.visible)
            .filter_map(|slot| slot.job.as_ref().map(ScanJob::view))
            .collect()
    }

    /// 所有任务（包括隐藏的）的只读视图
    pub fn all_jobs(&self) -> Vec<JobView> {
        let state = self.inner.state.lock();
        state
            .slots
            .iter()
            .filter_map(|slot| slot.job.as_ref().map(ScanJob::view))
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        let state = self.inner.state.lock();
        state
            .slots
            .iter()
            .filter(|slot| {
                slot.job
                    .as_ref()
                    .is_some_and(|job| job.status() == JobStatus::Pending)
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 追加计数，每次 `push` 加一
    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    /// 等待队列增长
    ///
    /// 若在 `timeout` 内有新任务追加（相对 `since` 代数）返回 `true`
    pub async fn wait_for_growth(&self, since: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.appended.notified();
            if self.generation() != since {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.generation() != since;
            }
        }
    }
}

impl std::fmt::Debug for ScanQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ScanQueue")
            .field("len", &state.slots.len())
            .field("generation", &state.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scan_job::{DocumentHandle, PageSelectionRequest};

    fn job(name: &str) -> ScanJob {
        ScanJob::new(DocumentHandle::new(name), name, 3, PageSelectionRequest::all()).unwrap()
    }

    #[test]
    fn push_assigns_increasing_ids_in_fifo_order() {
        let queue = ScanQueue::new();
        let a = queue.push(job("a.pdf"));
        let b = queue.push(job("b.pdf"));
        assert!(a < b);
        assert_eq!(queue.next_pending(), Some(a));
        assert_eq!(queue.generation(), 2);
    }

    #[test]
    fn checked_out_job_cannot_be_removed() {
        let queue = ScanQueue::new();
        let a = queue.push(job("a.pdf"));
        let taken = queue.checkout(a).unwrap();
        assert!(queue.remove_pending(a).is_none());
        assert_eq!(queue.next_pending(), None);
        queue.checkin(taken);
        assert!(queue.remove_pending(a).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn hidden_jobs_stay_in_structure() {
        let queue = ScanQueue::new();
        let a = queue.push(job("a.pdf"));
        queue.push(job("b.pdf"));
        queue.hide(a);
        assert_eq!(queue.visible_jobs().len(), 1);
        assert_eq!(queue.all_jobs().len(), 2);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn wait_for_growth_wakes_on_push() {
        let queue = ScanQueue::new();
        let since = queue.generation();
        let producer = queue.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(job("late.pdf"));
        });
        assert!(queue.wait_for_growth(since, Duration::from_secs(5)).await);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_growth_times_out_without_push() {
        let queue = ScanQueue::new();
        let since = queue.generation();
        assert!(!queue.wait_for_growth(since, Duration::from_millis(30)).await);
    }
}
