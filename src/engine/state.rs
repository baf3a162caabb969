use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::discovery::{Discovery, EnvDescriptor};
use crate::scenario::PlanRef;

/// 작업 식별자이다. 힐링 재시도에서도 유지된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 작업 큐 이름이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// 일반 실행 큐.
    Run,
    /// 셀프 힐링 큐.
    Healing,
    /// 보안 시나리오 큐.
    Security,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Run, QueueName::Healing, QueueName::Security];

    /// 외부에 노출되는 큐 이름이다.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Run => "test-runs",
            QueueName::Healing => "self-heal",
            QueueName::Security => "security-scan",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 실패 분류이다. SelectorNotFound만 힐링 대상이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 러너 프로세스를 시작하지 못했다.
    ProcessStart,
    /// 로케이터가 요소를 찾지 못했다.
    SelectorNotFound,
    /// 테스트 또는 작업 타임아웃.
    Timeout,
    /// 대상 애플리케이션에 연결하지 못했다.
    Network,
    /// 단언 실패.
    Assertion,
    /// 어댑터가 실행을 지원하지 않는다.
    Unsupported,
    /// 분류할 수 없는 실패.
    Unknown,
}

impl FailureKind {
    /// 셀프 힐링으로 보낼 수 있는지 확인한다.
    pub fn is_healable(&self) -> bool {
        matches!(self, FailureKind::SelectorNotFound)
    }
}

/// 종료된 작업의 실패 정보이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
    /// 프로세스 종료 코드. 시작 실패나 타임아웃이면 없다.
    pub exit_code: Option<i32>,
}

/// 작업 상태이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Created,
    Queued,
    Running,
    Succeeded,
    Failed(JobFailure),
}

impl JobStatus {
    /// 더 이상 진행되지 않는 상태인지 확인한다.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed(_))
    }

    /// 로그용 짧은 이름.
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed(_) => "failed",
        }
    }
}

/// 최근 로그 N줄만 보관하는 버퍼이다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// 한 줄을 추가하고 용량을 넘으면 가장 오래된 줄을 버린다.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// 보관 중인 줄을 오래된 순서로 반환한다.
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// 큐가 다루는 실행 단위이다.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// 현재 실행할 플랜 버전.
    pub plan: PlanRef,
    /// 어댑터 ID.
    pub framework: String,
    pub queue: QueueName,
    pub status: JobStatus,
    /// 0부터 시작한다. 힐링 재시도마다 1 증가한다.
    pub attempt: u32,
    pub env: Arc<EnvDescriptor>,
    /// 힐링에 필요한 Discovery. 없으면 힐링할 수 없다.
    pub discovery: Option<Arc<Discovery>>,
    pub log_tail: LogTail,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Created 상태의 작업을 만든다.
    pub fn new(
        plan: PlanRef,
        framework: impl Into<String>,
        queue: QueueName,
        env: Arc<EnvDescriptor>,
        discovery: Option<Arc<Discovery>>,
    ) -> Self {
        Self {
            id: JobId::new(),
            plan,
            framework: framework.into(),
            queue,
            status: JobStatus::Created,
            attempt: 0,
            env,
            discovery,
            log_tail: LogTail::default(),
            created_at: Utc::now(),
        }
    }

    /// 허용된 전이만 적용한다. 적용되지 않으면 `false`이다.
    ///
    /// created → queued → running → succeeded|failed, 그리고 failed → queued(힐링)만 허용된다.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        let allowed = matches!(
            (&self.status, &next),
            (JobStatus::Created, JobStatus::Queued)
                | (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed(_))
                | (JobStatus::Failed(_), JobStatus::Queued)
        );
        if allowed {
            self.status = next;
        }
        allowed
    }

    /// 실패한 작업을 힐링 큐로 보낸다. 첫 시도의 셀렉터 실패만 가능하다.
    pub fn requeue_for_healing(&mut self, plan: PlanRef) -> bool {
        let healable = match &self.status {
            JobStatus::Failed(failure) => failure.kind.is_healable(),
            _ => false,
        };
        if !healable || self.attempt > 0 || self.queue == QueueName::Healing {
            return false;
        }
        if !self.transition(JobStatus::Queued) {
            return false;
        }
        self.plan = plan;
        self.queue = QueueName::Healing;
        self.attempt += 1;
        true
    }

    /// 실패 정보를 반환한다.
    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.status {
            JobStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}
