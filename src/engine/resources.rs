use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::state::{Job, JobId};
use crate::scenario::{PlanRef, TestPlan};

/// 워커들이 공유하는 플랜 저장소이다. 버전별로 보관하며 덮어쓰지 않는다.
#[derive(Debug, Clone, Default)]
pub struct PlanStore {
    plans: Arc<Mutex<HashMap<PlanRef, Arc<TestPlan>>>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 플랜을 저장하고 참조를 돌려준다.
    pub fn insert(&self, plan: TestPlan) -> PlanRef {
        let key = plan.plan_ref();
        self.plans
            .lock()
            .expect("plan store mutex poisoned")
            .entry(key)
            .or_insert_with(|| Arc::new(plan));
        key
    }

    pub fn get(&self, key: &PlanRef) -> Option<Arc<TestPlan>> {
        self.plans
            .lock()
            .expect("plan store mutex poisoned")
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.plans.lock().expect("plan store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 작업별 최신 스냅샷. 제출 순서를 유지한다.
#[derive(Debug, Clone, Default)]
pub struct JobBoard {
    jobs: Arc<Mutex<IndexMap<JobId, Job>>>,
}

impl JobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 작업 상태를 기록한다. 같은 ID면 덮어쓴다.
    pub fn record(&self, job: &Job) {
        self.jobs
            .lock()
            .expect("job board mutex poisoned")
            .insert(job.id, job.clone());
    }

    /// 작업을 목록에서 지운다. 남은 작업의 순서는 유지된다.
    pub fn remove(&self, id: &JobId) -> Option<Job> {
        self.jobs
            .lock()
            .expect("job board mutex poisoned")
            .shift_remove(id)
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs
            .lock()
            .expect("job board mutex poisoned")
            .get(id)
            .cloned()
    }

    /// 제출 순서대로 모든 작업을 복사해 반환한다.
    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs
            .lock()
            .expect("job board mutex poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::EnvDescriptor;
    use crate::engine::state::{JobStatus, QueueName};
    use chrono::Utc;

    #[test]
    fn plan_versions_are_stored_side_by_side() {
        let store = PlanStore::new();
        let first = TestPlan::new("/", "sdet", Vec::new(), Utc::now());
        let second = first.revise(Vec::new());
        let a = store.insert(first.clone());
        let b = store.insert(second);
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&a).map(|p| p.plan_ref()), Some(first.plan_ref()));
    }

    #[test]
    fn board_keeps_latest_snapshot_in_submit_order() {
        let board = JobBoard::new();
        let plan = TestPlan::new("/", "sdet", Vec::new(), Utc::now()).plan_ref();
        let env = Arc::new(EnvDescriptor::default());
        let mut first = Job::new(plan, "playwright-ts", QueueName::Run, env.clone(), None);
        let second = Job::new(plan, "cypress-js", QueueName::Run, env, None);
        board.record(&first);
        board.record(&second);
        first.transition(JobStatus::Queued);
        board.record(&first);

        let jobs = board.snapshot();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, first.id);
        assert_eq!(jobs[0].status, JobStatus::Queued);
        assert_eq!(board.get(&second.id).map(|j| j.framework), Some("cypress-js".to_string()));

        assert!(board.remove(&first.id).is_some());
        assert!(board.remove(&first.id).is_none());
        assert_eq!(board.snapshot().iter().map(|j| j.id).collect::<Vec<_>>(), [second.id]);
    }
}
