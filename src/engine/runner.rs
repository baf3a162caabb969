use anyhow::{Context, bail};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::classify::classify;
use super::context::ExecutionContext;
use super::events::EngineEvent;
use super::healing::{HealOutcome, heal};
use super::queue::{JobQueue, QueueSet};
use super::resources::{JobBoard, PlanStore};
use super::state::{FailureKind, Job, JobFailure, JobId, JobStatus, LogTail, QueueName};
use crate::adapters::{AdapterRegistry, RenderOutput, RenderStatus};
use crate::config::OrchestratorConfig;
use crate::discovery::{Discovery, EnvDescriptor};
use crate::error::{EngineError, HealError, RunnerError};
use crate::scenario::{PlanRef, TestPlan};

/// 렌더링 디렉터리에 함께 기록되는 매니페스트 파일 이름.
pub const MANIFEST_FILE: &str = "manifest.json";

/// 실행 요청 하나이다.
#[derive(Debug, Clone)]
pub struct Submission {
    pub plan: TestPlan,
    pub framework: String,
    /// 치환 전 환경 설명. 제출 시점에 해석된다.
    pub env: EnvDescriptor,
    /// 힐링에 쓰인다. 없으면 셀렉터 실패가 곧 최종 실패이다.
    pub discovery: Option<Arc<Discovery>>,
}

/// 큐와 워커 풀을 묶어 작업을 끝까지 진행시키는 실행기이다.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    queues: QueueSet,
    adapters: AdapterRegistry,
    plans: PlanStore,
    jobs: JobBoard,
    config: OrchestratorConfig,
    sender: UnboundedSender<EngineEvent>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        adapters: AdapterRegistry,
        sender: UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            queues: QueueSet::new(&config.queues),
            adapters,
            plans: PlanStore::new(),
            jobs: JobBoard::new(),
            config,
            sender,
        }
    }

    /// 관리 작업(pause/drain/clean)에 쓰는 큐 묶음.
    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    pub fn job(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id)
    }

    /// 제출 순서대로 모든 작업의 현재 상태.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.snapshot()
    }

    pub fn plan(&self, key: &PlanRef) -> Option<Arc<TestPlan>> {
        self.plans.get(key)
    }

    /// 플랜을 검증해 큐에 넣는다. 보안 시나리오는 별도 플랜으로 나뉘어 보안 큐로 간다.
    ///
    /// 프레임워크나 환경 값이 잘못되면 아무것도 큐에 넣지 않고 실패한다.
    pub fn submit(&self, submission: Submission) -> Result<Vec<JobId>, EngineError> {
        let Submission {
            plan,
            framework,
            env,
            discovery,
        } = submission;
        self.adapters.get(&framework)?;
        let env = Arc::new(env.resolve()?);

        let (functional, security) = plan.split_security();
        let mut ids = Vec::new();
        for (queue, part) in [(QueueName::Run, functional), (QueueName::Security, security)] {
            let Some(part) = part else {
                continue;
            };
            let plan_ref = self.plans.insert(part);
            let mut job = Job::new(plan_ref, framework.clone(), queue, env.clone(), discovery.clone());
            job.transition(JobStatus::Queued);
            self.queues.get(queue).add(job.clone())?;
            self.jobs.record(&job);
            info!(job_id = %job.id, %queue, plan = %plan_ref, %framework, "작업 등록");
            let _ = self.sender.send(EngineEvent::JobQueued {
                job_id: job.id,
                queue,
                attempt: job.attempt,
            });
            ids.push(job.id);
        }
        Ok(ids)
    }

    /// 큐마다 워커를 띄우고 모든 큐가 빌 때까지 실행한다.
    ///
    /// `cancel`이 취소되면 새 작업을 받지 않고 실행 중인 작업만 마친다.
    pub async fn run_until_idle(&self, cancel: CancellationToken) -> Vec<Job> {
        let token = cancel.child_token();
        let mut workers: FuturesUnordered<tokio::task::JoinHandle<()>> = FuturesUnordered::new();
        for queue in self.queues.iter() {
            for index in 0..queue.config().workers() {
                let this = self.clone();
                let queue = queue.clone();
                let token = token.clone();
                workers.push(tokio::spawn(async move {
                    this.worker(queue, index, token).await;
                }));
            }
        }

        let queues = self.queues.clone();
        let monitor_token = token.clone();
        let monitor = tokio::spawn(async move {
            loop {
                if queues.all_idle() {
                    monitor_token.cancel();
                    break;
                }
                tokio::select! {
                    _ = monitor_token.cancelled() => break,
                    _ = sleep(Duration::from_millis(50)) => {}
                }
            }
        });

        while let Some(joined) = workers.next().await {
            if let Err(err) = joined {
                warn!(error = %err, "워커 태스크 비정상 종료");
            }
        }
        monitor.abort();
        if cancel.is_cancelled() {
            self.halt();
        }
        self.jobs.snapshot()
    }

    /// 모든 큐를 정지하고, 실행되지 못하고 버려진 작업을 작업 목록에서도 지운다.
    pub fn halt(&self) -> usize {
        let dropped = self.queues.halt();
        for job_id in &dropped {
            self.jobs.remove(job_id);
        }
        if !dropped.is_empty() {
            info!(dropped = dropped.len(), "대기 작업 폐기");
        }
        dropped.len()
    }

    async fn worker(&self, queue: Arc<JobQueue>, index: usize, cancel: CancellationToken) {
        debug!(queue = %queue.name(), index, "워커 시작");
        while let Some(job) = queue.next(&cancel).await {
            self.process(&queue, job).await;
        }
        debug!(queue = %queue.name(), index, "워커 종료");
    }

    /// 작업 하나를 실행하고 종료 상태 또는 힐링 큐로 보낸다.
    async fn process(&self, queue: &JobQueue, mut job: Job) {
        job.transition(JobStatus::Running);
        job.log_tail = LogTail::new(self.config.log_tail_lines);
        self.jobs.record(&job);
        info!(job_id = %job.id, queue = %job.queue, attempt = job.attempt, plan = %job.plan, "작업 시작");
        let _ = self.sender.send(EngineEvent::JobStarted {
            job_id: job.id,
            queue: job.queue,
            attempt: job.attempt,
        });

        let attempt_dir = self.attempt_dir(&job);
        let outcome = self.execute(&mut job, &attempt_dir).await;
        self.cleanup(&job, &attempt_dir).await;

        let status = match outcome {
            Ok(()) => JobStatus::Succeeded,
            Err(failure) => JobStatus::Failed(failure),
        };
        job.transition(status);

        if self.healing_eligible(&job) {
            match self.heal_job(&job) {
                Ok(outcome) => {
                    if self.hand_off(queue, &job, outcome) {
                        return;
                    }
                }
                Err(err) => {
                    warn!(job_id = %job.id, error = %err, "힐링 불가");
                    if let JobStatus::Failed(failure) = &mut job.status {
                        failure.message = format!("{} (힐링 불가: {err})", failure.message);
                    }
                }
            }
        }

        self.jobs.record(&job);
        match job.failure() {
            None => info!(job_id = %job.id, queue = %job.queue, "작업 성공"),
            Some(failure) => warn!(
                job_id = %job.id,
                queue = %job.queue,
                kind = ?failure.kind,
                exit_code = ?failure.exit_code,
                message = %failure.message,
                "작업 실패"
            ),
        }
        let _ = self.sender.send(EngineEvent::JobFinished {
            job_id: job.id,
            queue: job.queue,
            status: job.status.clone(),
        });
        queue.complete(job);
    }

    fn attempt_dir(&self, job: &Job) -> PathBuf {
        self.config
            .work_root
            .join(job.id.to_string())
            .join(format!("attempt-{}", job.attempt))
    }

    /// 렌더링부터 실행, 실패 분류까지 수행한다.
    async fn execute(&self, job: &mut Job, dir: &Path) -> Result<(), JobFailure> {
        let plan = self
            .plans
            .get(&job.plan)
            .ok_or_else(|| failure(FailureKind::Unknown, format!("플랜 {}을 찾을 수 없습니다", job.plan)))?;
        let adapter = self
            .adapters
            .get(&job.framework)
            .map_err(|err| failure(FailureKind::Unsupported, err.to_string()))?;

        let output = adapter.render(&plan);
        if output.status == RenderStatus::NotImplemented {
            return Err(failure(
                FailureKind::Unsupported,
                format!("{} 어댑터는 아직 코드 생성을 지원하지 않습니다", adapter.id()),
            ));
        }
        for error in &output.failures {
            let line = format!("렌더링 제외: {error}");
            warn!(job_id = %job.id, scenario = %error.scenario_id, step = error.step_index, reason = %error.reason, "시나리오 렌더링 실패");
            self.log_line(job.id, &mut job.log_tail, &line);
        }
        if output.manifest.count == 0 {
            if output.failures.is_empty() {
                info!(job_id = %job.id, "실행할 시나리오가 없어 러너를 건너뜀");
                return Ok(());
            }
            return Err(failure(
                FailureKind::Unknown,
                format!("렌더링된 시나리오가 없습니다 ({}개 제외)", output.failures.len()),
            ));
        }

        write_rendered(dir, &output)
            .await
            .map_err(|err| failure(FailureKind::ProcessStart, format!("{err:#}")))?;

        let env = runner_env(&job.env, plan.base_url());
        let runner = adapter.runner();
        let job_id = job.id;
        let sender = self.sender.clone();
        let tail = &mut job.log_tail;
        let mut on_line = |line: &str| {
            tail.push(line);
            let _ = sender.send(EngineEvent::JobLog {
                job_id,
                line: line.to_string(),
            });
        };

        // 설치와 실행이 같은 기한을 나눠 쓴다.
        let timeout = self.config.job_timeout();
        let attempt = async {
            runner.install(dir, &env, &mut on_line).await?;
            runner.run(dir, &env, &mut on_line).await
        };
        let code = match tokio::time::timeout(timeout, attempt).await {
            Err(_) => {
                return Err(failure(
                    FailureKind::Timeout,
                    format!("작업 타임아웃 {}초 초과", timeout.as_secs()),
                ));
            }
            Ok(result) => result.map_err(runner_failure)?,
        };
        if code == 0 {
            return Ok(());
        }

        let classification = classify(&job.log_tail.lines());
        Err(JobFailure {
            kind: classification.kind,
            message: classification
                .evidence
                .map(|line| line.trim().to_string())
                .unwrap_or_else(|| format!("종료 코드 {code}")),
            exit_code: Some(code),
        })
    }

    fn log_line(&self, job_id: JobId, tail: &mut LogTail, line: &str) {
        tail.push(line);
        let _ = self.sender.send(EngineEvent::JobLog {
            job_id,
            line: line.to_string(),
        });
    }

    async fn cleanup(&self, job: &Job, attempt_dir: &Path) {
        if self.config.keep_artifacts {
            return;
        }
        if fs::metadata(attempt_dir).await.is_ok() {
            if let Err(err) = fs::remove_dir_all(attempt_dir).await {
                warn!(job_id = %job.id, dir = %attempt_dir.display(), error = %err, "렌더링 디렉터리 삭제 실패");
            }
        }
        if let Some(job_dir) = attempt_dir.parent() {
            // 다른 시도 디렉터리가 남아 있으면 실패하며 그대로 둔다.
            let _ = fs::remove_dir(job_dir).await;
        }
    }

    fn healing_eligible(&self, job: &Job) -> bool {
        job.failure().is_some_and(|failure| failure.kind.is_healable())
            && job.attempt == 0
            && job.queue != QueueName::Healing
    }

    fn heal_job(&self, job: &Job) -> Result<HealOutcome, HealError> {
        let discovery = job.discovery.as_deref().ok_or(HealError::MissingDiscovery)?;
        let plan = self.plans.get(&job.plan).ok_or(HealError::NoEvidence)?;
        let evidence = job.failure().map(|f| f.message.as_str()).unwrap_or_default();
        heal(&plan, discovery, evidence)
    }

    /// 고친 플랜으로 작업을 힐링 큐에 넘긴다. 넘기지 못하면 `false`이다.
    ///
    /// 원래 큐의 활성 목록에서 빼기 전에 힐링 큐에 먼저 넣는다.
    fn hand_off(&self, source: &JobQueue, job: &Job, outcome: HealOutcome) -> bool {
        let plan_ref = self.plans.insert(outcome.plan);
        let mut healed = job.clone();
        if !healed.requeue_for_healing(plan_ref) {
            return false;
        }
        if let Err(err) = self.queues.get(QueueName::Healing).add(healed.clone()) {
            warn!(job_id = %job.id, error = %err, "힐링 큐에 넣지 못함");
            return false;
        }
        source.release(job.id);
        self.jobs.record(&healed);

        let changes: Vec<String> = outcome.changes.iter().map(ToString::to_string).collect();
        info!(job_id = %healed.id, plan = %plan_ref, changes = ?changes, "셀렉터 힐링");
        let _ = self.sender.send(EngineEvent::JobHealing {
            job_id: healed.id,
            plan: plan_ref,
            changes,
        });
        let _ = self.sender.send(EngineEvent::JobQueued {
            job_id: healed.id,
            queue: healed.queue,
            attempt: healed.attempt,
        });
        true
    }
}

fn failure(kind: FailureKind, message: impl Into<String>) -> JobFailure {
    JobFailure {
        kind,
        message: message.into(),
        exit_code: None,
    }
}

fn runner_failure(err: RunnerError) -> JobFailure {
    let kind = match &err {
        RunnerError::NotImplemented(_) => FailureKind::Unsupported,
        _ => FailureKind::ProcessStart,
    };
    failure(kind, err.to_string())
}

/// 러너에 넘길 환경 변수를 만든다. 사용자 변수 위에 기본 URL과 인증 값을 덮어쓴다.
pub fn runner_env(env: &EnvDescriptor, plan_base_url: &str) -> HashMap<String, String> {
    let mut ctx = ExecutionContext::new();
    for (key, value) in &env.vars {
        ctx.set_var(key.clone(), value.clone());
    }
    let base_url = env.base_url.as_deref().unwrap_or(plan_base_url);
    for key in ["TM_BASE_URL", "BASE_URL", "PW_BASE_URL", "CYPRESS_BASE_URL"] {
        ctx.set_var(key, base_url);
    }
    if let Some(auth) = &env.auth {
        ctx.set_var("TM_AUTH_USERNAME", auth.username.clone());
        ctx.set_var("TM_AUTH_PASSWORD", auth.password.clone());
    }
    ctx.to_env()
}

/// 렌더링 결과와 `manifest.json`을 `root` 아래에 쓰고 모두 생성되었는지 확인한다.
pub async fn write_rendered(root: &Path, output: &RenderOutput) -> anyhow::Result<()> {
    fs::create_dir_all(root)
        .await
        .with_context(|| format!("디렉터리 생성 실패: {}", root.display()))?;
    for file in &output.files {
        let path = root.join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("디렉터리 생성 실패: {}", parent.display()))?;
        }
        fs::write(&path, &file.content)
            .await
            .with_context(|| format!("파일 쓰기 실패: {}", path.display()))?;
    }
    let manifest = serde_json::to_string_pretty(&output.manifest)?;
    fs::write(root.join(MANIFEST_FILE), manifest)
        .await
        .with_context(|| format!("매니페스트 쓰기 실패: {}", root.display()))?;

    let pattern = format!("{}/**/*", glob::Pattern::escape(&root.to_string_lossy()));
    let written: BTreeSet<PathBuf> = glob::glob(&pattern)?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .filter_map(|path| path.strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    let missing: Vec<String> = output
        .files
        .iter()
        .map(|file| file.path.clone())
        .chain(std::iter::once(PathBuf::from(MANIFEST_FILE)))
        .filter(|path| !written.contains(path))
        .map(|path| path.display().to_string())
        .collect();
    if !missing.is_empty() {
        bail!("렌더링 산출물 누락: {}", missing.join(", "));
    }
    debug!(root = %root.display(), files = written.len(), "렌더링 산출물 기록");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FrameworkAdapter, RenderSettings};
    use crate::discovery::{AuthCredentials, DiscoveredForm, DiscoveredPage, FieldDescriptor};
    use crate::executor::{SharedRunner, TestRunner};
    use crate::scenario::{CoverageType, Manifest, RenderedFile, Scenario, Step};
    use crate::synthesis::Locator;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    #[derive(Debug, Clone, Copy)]
    enum Script {
        /// `label=Email Address`가 남아 있는 동안만 셀렉터 실패.
        FailOnLabel,
        /// 항상 셀렉터 실패.
        AlwaysSelector,
        Network,
        Hang,
        /// 의존성 설치 단계에서 멈춘다.
        HangInstall,
    }

    struct FakeRunner {
        script: Script,
        runs: Arc<AtomicUsize>,
    }

    fn selector_failure(on_line: &mut (dyn for<'a> FnMut(&'a str) + Send)) -> i32 {
        on_line("Error: locator.fill: Timeout 5000ms exceeded.");
        on_line("Call log:");
        on_line("  - waiting for getByLabel('Email Address')");
        1
    }

    #[async_trait]
    impl TestRunner for FakeRunner {
        fn id(&self) -> &str {
            "fake"
        }

        async fn install(
            &self,
            _cwd: &Path,
            _env: &HashMap<String, String>,
            on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
        ) -> Result<(), RunnerError> {
            if let Script::HangInstall = self.script {
                on_line("npm install");
                sleep(Duration::from_secs(3600)).await;
            }
            Ok(())
        }

        async fn run(
            &self,
            cwd: &Path,
            env: &HashMap<String, String>,
            on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
        ) -> Result<i32, RunnerError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let cases = tokio::fs::read_to_string(cwd.join("cases.txt"))
                .await
                .unwrap_or_default();
            on_line(&format!("base {}", env.get("TM_BASE_URL").cloned().unwrap_or_default()));
            Ok(match self.script {
                Script::FailOnLabel if cases.contains("label=Email Address") => selector_failure(on_line),
                Script::FailOnLabel => {
                    on_line("1 passed");
                    0
                }
                Script::AlwaysSelector => selector_failure(on_line),
                Script::Network => {
                    on_line("page.goto: net::ERR_CONNECTION_REFUSED at http://localhost:4173/");
                    1
                }
                Script::Hang | Script::HangInstall => {
                    sleep(Duration::from_secs(30)).await;
                    0
                }
            })
        }
    }

    struct FakeAdapter {
        script: Script,
        runs: Arc<AtomicUsize>,
    }

    impl FrameworkAdapter for FakeAdapter {
        fn id(&self) -> &'static str {
            "fake"
        }

        fn display_name(&self) -> &'static str {
            "Fake"
        }

        fn render(&self, plan: &TestPlan) -> RenderOutput {
            let targets: Vec<&str> = plan
                .cases()
                .iter()
                .flat_map(|case| case.steps.iter())
                .filter_map(|step| step.target.as_deref())
                .collect();
            RenderOutput {
                files: vec![RenderedFile::new("cases.txt", targets.join("\n"))],
                manifest: Manifest {
                    adapter: "fake".into(),
                    pages: Vec::new(),
                    count: plan.cases().len(),
                },
                status: RenderStatus::Complete,
                failures: Vec::new(),
            }
        }

        fn runner(&self) -> SharedRunner {
            Arc::new(FakeRunner {
                script: self.script,
                runs: self.runs.clone(),
            })
        }

        fn locator_expression(&self, locator: &Locator) -> String {
            locator.to_string()
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        events: UnboundedReceiver<EngineEvent>,
        runs: Arc<AtomicUsize>,
        work: tempfile::TempDir,
    }

    fn harness(script: Script, tune: impl FnOnce(&mut OrchestratorConfig)) -> Harness {
        let work = tempfile::tempdir().expect("tempdir");
        let mut config = OrchestratorConfig {
            work_root: work.path().to_path_buf(),
            ..OrchestratorConfig::default()
        };
        tune(&mut config);
        let runs = Arc::new(AtomicUsize::new(0));
        let mut adapters = AdapterRegistry::with_builtin(&RenderSettings::default());
        adapters.register(Arc::new(FakeAdapter {
            script,
            runs: runs.clone(),
        }));
        let (tx, rx) = unbounded_channel();
        Harness {
            orchestrator: Orchestrator::new(config, adapters, tx),
            events: rx,
            runs,
            work,
        }
    }

    fn discovery() -> Arc<Discovery> {
        Arc::new(Discovery {
            base_url: None,
            pages: vec![DiscoveredPage {
                path: "/login".into(),
                forms: vec![DiscoveredForm {
                    fields: vec![FieldDescriptor {
                        label: Some("Email Address".into()),
                        name: Some("email".into()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        })
    }

    fn login_case() -> Scenario {
        Scenario::new("form-happy-path:/login", "Submit login", CoverageType::Branch).with_steps(vec![
            Step::goto("/login"),
            Step::fill("label=Email Address", "qa+auto@example.com"),
            Step::click("button=Log in"),
        ])
    }

    fn submission(framework: &str, cases: Vec<Scenario>) -> Submission {
        Submission {
            plan: TestPlan::new("http://localhost:4173", "sdet", cases, Utc::now()),
            framework: framework.into(),
            env: EnvDescriptor::default(),
            discovery: Some(discovery()),
        }
    }

    fn drain_events(rx: &mut UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// 셀렉터 실패는 힐링 큐로 한 번 옮겨져 고친 플랜으로 성공한다.
    #[tokio::test]
    async fn selector_failure_heals_once_then_succeeds() {
        let mut h = harness(Script::FailOnLabel, |_| {});
        let ids = h
            .orchestrator
            .submit(submission("fake", vec![login_case()]))
            .expect("submit");
        assert_eq!(ids.len(), 1);

        let jobs = h.orchestrator.run_until_idle(CancellationToken::new()).await;
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.id, ids[0]);
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.queue, QueueName::Healing);
        assert_eq!(job.attempt, 1);
        assert_eq!(h.runs.load(Ordering::SeqCst), 2);

        let plan = h.orchestrator.plan(&job.plan).expect("healed plan");
        assert_eq!(plan.id().version, 2);
        assert_eq!(plan.cases()[0].steps[1].target.as_deref(), Some("name=email"));

        let events = drain_events(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::JobHealing { changes, .. } if changes.iter().any(|c| c.contains("name=email"))
        )));
        assert!(events.iter().any(|e| matches!(e, EngineEvent::JobLog { line, .. } if line == "base http://localhost:4173")));
        assert_eq!(h.orchestrator.queues().get(QueueName::Run).counts().completed, 0);
        assert_eq!(h.orchestrator.queues().get(QueueName::Healing).counts().completed, 1);
    }

    /// 힐링 후에도 셀렉터 실패가 반복되면 최종 실패이다.
    #[tokio::test]
    async fn second_selector_failure_is_terminal() {
        let h = harness(Script::AlwaysSelector, |_| {});
        h.orchestrator
            .submit(submission("fake", vec![login_case()]))
            .expect("submit");
        let jobs = h.orchestrator.run_until_idle(CancellationToken::new()).await;

        let failure = jobs[0].failure().expect("failed");
        assert_eq!(failure.kind, FailureKind::SelectorNotFound);
        assert_eq!(failure.exit_code, Some(1));
        assert_eq!(jobs[0].attempt, 1);
        assert_eq!(h.runs.load(Ordering::SeqCst), 2);
        assert!(jobs[0].log_tail.lines().iter().any(|l| l.contains("getByLabel")));
    }

    /// 네트워크 실패는 힐링하지 않는다.
    #[tokio::test]
    async fn network_failure_never_heals() {
        let h = harness(Script::Network, |_| {});
        h.orchestrator
            .submit(submission("fake", vec![login_case()]))
            .expect("submit");
        let jobs = h.orchestrator.run_until_idle(CancellationToken::new()).await;

        assert_eq!(jobs[0].failure().map(|f| f.kind), Some(FailureKind::Network));
        assert_eq!(jobs[0].queue, QueueName::Run);
        assert_eq!(jobs[0].attempt, 0);
        assert_eq!(h.runs.load(Ordering::SeqCst), 1);
    }

    /// Discovery가 없으면 셀렉터 실패도 그대로 끝난다.
    #[tokio::test]
    async fn selector_failure_without_discovery_is_terminal() {
        let h = harness(Script::FailOnLabel, |_| {});
        let mut request = submission("fake", vec![login_case()]);
        request.discovery = None;
        h.orchestrator.submit(request).expect("submit");
        let jobs = h.orchestrator.run_until_idle(CancellationToken::new()).await;

        let failure = jobs[0].failure().expect("failed");
        assert_eq!(failure.kind, FailureKind::SelectorNotFound);
        assert!(failure.message.contains("힐링 불가"));
        assert_eq!(jobs[0].attempt, 0);
    }

    /// 빈 플랜은 러너를 띄우지 않고 성공한다.
    #[tokio::test]
    async fn empty_plan_succeeds_without_running() {
        let h = harness(Script::Network, |_| {});
        h.orchestrator.submit(submission("fake", Vec::new())).expect("submit");
        let jobs = h.orchestrator.run_until_idle(CancellationToken::new()).await;
        assert_eq!(jobs[0].status, JobStatus::Succeeded);
        assert_eq!(h.runs.load(Ordering::SeqCst), 0);
    }

    /// 보안 시나리오는 별도 플랜으로 보안 큐에서 실행된다.
    #[tokio::test]
    async fn security_cases_run_on_security_queue() {
        let h = harness(Script::FailOnLabel, |_| {});
        let probe = Scenario::new("injection-probe:/login#form:xss", "XSS", CoverageType::Security)
            .with_steps(vec![Step::goto("/login"), Step::fill("name=q", "<script>")]);
        let ids = h
            .orchestrator
            .submit(submission("fake", vec![login_case(), probe]))
            .expect("submit");
        assert_eq!(ids.len(), 2);

        let jobs = h.orchestrator.run_until_idle(CancellationToken::new()).await;
        let security = jobs.iter().find(|j| j.id == ids[1]).expect("security job");
        assert_eq!(security.queue, QueueName::Security);
        assert_eq!(security.status, JobStatus::Succeeded);
        let plan = h.orchestrator.plan(&security.plan).expect("plan");
        assert!(plan.cases().iter().all(Scenario::is_security));
        assert!(plan.id().parent.is_some());
    }

    /// 코드 생성을 지원하지 않는 어댑터는 Unsupported로 끝난다.
    #[tokio::test]
    async fn stub_adapter_is_unsupported() {
        let h = harness(Script::Network, |_| {});
        h.orchestrator
            .submit(submission("xctest", vec![login_case()]))
            .expect("submit");
        let jobs = h.orchestrator.run_until_idle(CancellationToken::new()).await;
        assert_eq!(jobs[0].failure().map(|f| f.kind), Some(FailureKind::Unsupported));
    }

    /// 작업 타임아웃을 넘기면 러너를 중단하고 Timeout으로 끝난다.
    #[tokio::test]
    async fn job_timeout_kills_the_run() {
        let h = harness(Script::Hang, |config| config.job_timeout_secs = 1);
        h.orchestrator
            .submit(submission("fake", vec![login_case()]))
            .expect("submit");
        let jobs = h.orchestrator.run_until_idle(CancellationToken::new()).await;
        let failure = jobs[0].failure().expect("failed");
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.exit_code, None);
    }

    /// 의존성 설치가 멈춰도 같은 작업 타임아웃으로 끝난다.
    #[tokio::test]
    async fn job_timeout_covers_install() {
        let h = harness(Script::HangInstall, |config| config.job_timeout_secs = 1);
        h.orchestrator
            .submit(submission("fake", vec![login_case()]))
            .expect("submit");
        let jobs = tokio::time::timeout(
            Duration::from_secs(10),
            h.orchestrator.run_until_idle(CancellationToken::new()),
        )
        .await
        .expect("finished within the job timeout");
        let failure = jobs[0].failure().expect("failed");
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(h.runs.load(Ordering::SeqCst), 0);
        assert!(jobs[0].log_tail.lines().iter().any(|l| l == "npm install"));
    }

    /// 취소되면 실행되지 못한 작업은 큐와 작업 목록에서 모두 사라진다.
    #[tokio::test]
    async fn cancelled_run_drops_waiting_jobs_from_board() {
        let h = harness(Script::Network, |_| {});
        let ids = h
            .orchestrator
            .submit(submission("fake", vec![login_case()]))
            .expect("submit");
        assert_eq!(h.orchestrator.job(&ids[0]).map(|j| j.status), Some(JobStatus::Queued));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let jobs = h.orchestrator.run_until_idle(cancel).await;
        assert!(jobs.is_empty());
        assert!(h.orchestrator.job(&ids[0]).is_none());
        assert!(h.orchestrator.queues().all_idle());
        assert_eq!(h.runs.load(Ordering::SeqCst), 0);
        assert_eq!(h.orchestrator.halt(), 0);
    }

    /// 잘못된 프레임워크나 환경 값은 큐에 넣기 전에 거부된다.
    #[tokio::test]
    async fn submit_fails_fast() {
        let h = harness(Script::Network, |_| {});
        assert!(matches!(
            h.orchestrator.submit(submission("selenium", vec![login_case()])),
            Err(EngineError::Config(_))
        ));
        let mut request = submission("fake", vec![login_case()]);
        request.env.auth = Some(AuthCredentials {
            username: "${TF_UNSET_USER_4821}".into(),
            password: "secret".into(),
        });
        assert!(h.orchestrator.submit(request).is_err());
        assert!(h.orchestrator.jobs().is_empty());
        assert!(h.orchestrator.queues().all_idle());
    }

    /// 작업 디렉터리는 종료 후 지워지고, 설정하면 남는다.
    #[tokio::test]
    async fn artifacts_are_removed_unless_kept() {
        let h = harness(Script::Network, |_| {});
        let ids = h
            .orchestrator
            .submit(submission("fake", vec![login_case()]))
            .expect("submit");
        h.orchestrator.run_until_idle(CancellationToken::new()).await;
        assert!(!h.work.path().join(ids[0].to_string()).exists());

        let kept = harness(Script::Network, |config| config.keep_artifacts = true);
        let ids = kept
            .orchestrator
            .submit(submission("fake", vec![login_case()]))
            .expect("submit");
        kept.orchestrator.run_until_idle(CancellationToken::new()).await;
        let dir = kept.work.path().join(ids[0].to_string()).join("attempt-0");
        assert!(dir.join("cases.txt").is_file());
        assert!(dir.join(MANIFEST_FILE).is_file());
    }

    #[test]
    fn runner_env_overrides_user_vars_with_base_url_and_auth() {
        let mut env = EnvDescriptor::default();
        env.vars.insert("BASE_URL".into(), "http://ignored".into());
        env.vars.insert("TENANT".into(), "acme".into());
        env.auth = Some(AuthCredentials {
            username: "qa".into(),
            password: "pw".into(),
        });
        let vars = runner_env(&env, "http://localhost:4173");
        assert_eq!(vars.get("BASE_URL").map(String::as_str), Some("http://localhost:4173"));
        assert_eq!(vars.get("CYPRESS_BASE_URL").map(String::as_str), Some("http://localhost:4173"));
        assert_eq!(vars.get("TENANT").map(String::as_str), Some("acme"));
        assert_eq!(vars.get("TM_AUTH_USERNAME").map(String::as_str), Some("qa"));
    }
}
