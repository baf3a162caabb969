use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::{Job, JobId, JobStatus, QueueName};
use crate::config::{QueueConfig, QueuesConfig};
use crate::error::EngineError;

/// `clean`이 정리할 종료 작업 종류이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanStatus {
    Completed,
    Failed,
}

impl CleanStatus {
    fn matches(&self, status: &JobStatus) -> bool {
        match self {
            CleanStatus::Completed => matches!(status, JobStatus::Succeeded),
            CleanStatus::Failed => matches!(status, JobStatus::Failed(_)),
        }
    }
}

/// 큐 상태 요약이다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    waiting: VecDeque<Job>,
    delayed: Vec<(Instant, Job)>,
    active: HashSet<JobId>,
    finished: VecDeque<(Instant, Job)>,
    paused: bool,
    closed: bool,
}

impl QueueState {
    /// 기한이 지난 지연 작업을 대기열 뒤로 옮긴다. 남은 가장 이른 기한을 반환한다.
    fn promote_due(&mut self, now: Instant) -> Option<Instant> {
        self.delayed.sort_by_key(|(ready_at, _)| *ready_at);
        while self
            .delayed
            .first()
            .is_some_and(|(ready_at, _)| *ready_at <= now)
        {
            let (_, job) = self.delayed.remove(0);
            self.waiting.push_back(job);
        }
        self.delayed.first().map(|(ready_at, _)| *ready_at)
    }
}

/// 이름 있는 FIFO 작업 큐 서비스이다. 워커는 `next`로 작업을 가져간다.
#[derive(Debug)]
pub struct JobQueue {
    name: QueueName,
    config: QueueConfig,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl JobQueue {
    pub fn new(name: QueueName, config: QueueConfig) -> Self {
        Self {
            name,
            config,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> QueueName {
        self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().expect("queue state mutex poisoned")
    }

    /// 작업을 넣는다. 지연이 설정된 큐면 지연 목록에 들어간다.
    pub fn add(&self, job: Job) -> Result<(), EngineError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(EngineError::QueueClosed(self.name.to_string()));
            }
            let delay = self.config.delay();
            if delay.is_zero() {
                state.waiting.push_back(job);
            } else {
                state.delayed.push((Instant::now() + delay, job));
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// 다음 작업을 기다린다. 큐가 닫히거나 `cancel`이 취소되면 `None`이다.
    ///
    /// 일시 정지 중에는 작업을 내주지 않는다.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<Job> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                let wake_at = state.promote_due(Instant::now());
                if !state.paused {
                    if let Some(job) = state.waiting.pop_front() {
                        state.active.insert(job.id);
                        return Some(job);
                    }
                }
                wake_at
            };

            let deadline = wake_at.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
    }

    /// 실행이 끝난 작업을 종료 기록으로 옮긴다.
    pub fn complete(&self, job: Job) {
        let mut state = self.lock();
        state.active.remove(&job.id);
        state.finished.push_back((Instant::now(), job));
    }

    /// 다른 큐로 넘어간 작업을 기록 없이 활성 목록에서 뺀다.
    pub fn release(&self, job_id: JobId) {
        self.lock().active.remove(&job_id);
    }

    /// 새 작업 배정을 멈춘다. 실행 중인 작업은 계속된다.
    pub fn pause(&self) {
        self.lock().paused = true;
        info!(queue = %self.name, "큐 일시 정지");
    }

    /// 작업 배정을 재개한다.
    pub fn resume(&self) {
        self.lock().paused = false;
        self.notify.notify_waiters();
    }

    /// 대기 작업을 제거하고 그 ID를 돌려준다. `force`면 지연 작업도 제거한다.
    /// 실행 중인 작업은 건드리지 않는다.
    pub fn drain(&self, force: bool) -> Vec<JobId> {
        let mut state = self.lock();
        let mut removed: Vec<JobId> = state.waiting.drain(..).map(|job| job.id).collect();
        if force {
            removed.extend(state.delayed.drain(..).map(|(_, job)| job.id));
        }
        debug!(queue = %self.name, removed = removed.len(), force, "큐 비우기");
        removed
    }

    /// `grace`보다 오래된 종료 기록을 최대 `limit`개 지운다. `limit`이 0이면 제한이 없다.
    pub fn clean(&self, grace: Duration, limit: usize, status: CleanStatus) -> usize {
        let now = Instant::now();
        let limit = if limit == 0 { usize::MAX } else { limit };
        let mut state = self.lock();
        let mut removed = 0;
        state.finished.retain(|(finished_at, job)| {
            let expired = now.saturating_duration_since(*finished_at) >= grace;
            if removed < limit && expired && status.matches(&job.status) {
                removed += 1;
                false
            } else {
                true
            }
        });
        debug!(queue = %self.name, removed, ?status, "종료 기록 정리");
        removed
    }

    /// 현재 상태 요약.
    pub fn counts(&self) -> QueueCounts {
        let state = self.lock();
        let completed = state
            .finished
            .iter()
            .filter(|(_, job)| CleanStatus::Completed.matches(&job.status))
            .count();
        QueueCounts {
            waiting: state.waiting.len(),
            delayed: state.delayed.len(),
            active: state.active.len(),
            completed,
            failed: state.finished.len() - completed,
            paused: state.paused,
        }
    }

    /// 대기, 지연, 실행 중인 작업이 하나도 없는지 확인한다.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.waiting.is_empty() && state.delayed.is_empty() && state.active.is_empty()
    }

    /// 큐를 닫는다. 대기 중인 워커는 모두 깨어나 종료한다.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }
}

/// 실행, 힐링, 보안 큐 묶음이다.
#[derive(Debug, Clone)]
pub struct QueueSet {
    run: Arc<JobQueue>,
    healing: Arc<JobQueue>,
    security: Arc<JobQueue>,
}

impl QueueSet {
    pub fn new(config: &QueuesConfig) -> Self {
        Self {
            run: Arc::new(JobQueue::new(QueueName::Run, config.run.clone())),
            healing: Arc::new(JobQueue::new(QueueName::Healing, config.healing.clone())),
            security: Arc::new(JobQueue::new(QueueName::Security, config.security.clone())),
        }
    }

    /// 이름으로 큐를 가져온다.
    pub fn get(&self, name: QueueName) -> &Arc<JobQueue> {
        match name {
            QueueName::Run => &self.run,
            QueueName::Healing => &self.healing,
            QueueName::Security => &self.security,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<JobQueue>> {
        [&self.run, &self.healing, &self.security].into_iter()
    }

    /// 모든 큐가 비었는지 확인한다.
    pub fn all_idle(&self) -> bool {
        self.iter().all(|queue| queue.is_idle())
    }

    /// 전체 정지: 모든 큐를 멈추고, 대기/지연 작업을 버리고, 종료 기록을 지운다.
    ///
    /// 버려진 작업 ID를 돌려준다.
    pub fn halt(&self) -> Vec<JobId> {
        for queue in self.iter() {
            queue.pause();
        }
        let mut dropped = Vec::new();
        for queue in self.iter() {
            let drained = queue.drain(true);
            let completed = queue.clean(Duration::ZERO, 0, CleanStatus::Completed);
            let failed = queue.clean(Duration::ZERO, 0, CleanStatus::Failed);
            info!(queue = %queue.name(), drained = drained.len(), completed, failed, "큐 정지");
            dropped.extend(drained);
        }
        dropped
    }
}
