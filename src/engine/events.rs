use super::state::{JobId, JobStatus, QueueName};
use crate::scenario::PlanRef;

/// 오케스트레이터에서 관찰자(CLI 등)로 전달되는 이벤트 모델이다.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// 작업이 큐에 들어갔다.
    JobQueued {
        job_id: JobId,
        queue: QueueName,
        attempt: u32,
    },
    /// 워커가 작업을 시작했다.
    JobStarted {
        job_id: JobId,
        queue: QueueName,
        attempt: u32,
    },
    /// 러너 출력 한 줄.
    JobLog { job_id: JobId, line: String },
    /// 셀렉터 실패를 고친 새 플랜 버전으로 힐링 큐에 보냈다.
    JobHealing {
        job_id: JobId,
        plan: PlanRef,
        changes: Vec<String>,
    },
    /// 작업이 종료 상태가 되었다.
    JobFinished {
        job_id: JobId,
        queue: QueueName,
        status: JobStatus,
    },
}
