use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use testforge::adapters::{AdapterRegistry, RenderStatus};
use testforge::compiler::compile;
use testforge::config::{OrchestratorConfig, load_config_from_file};
use testforge::discovery::{EnvDescriptor, load_discovery_from_file, load_env_from_file};
use testforge::engine::{EngineEvent, JobStatus, Orchestrator, Submission, write_rendered};
use testforge::patterns::PatternLibrary;
use testforge::scenario::{load_plan_from_file, plan_to_yaml};

#[derive(Parser)]
#[command(name = "testforge")]
#[command(about = "Discovery 기반 테스트 플랜 컴파일러와 실행 오케스트레이터")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discovery와 페르소나로 TestPlan YAML을 만든다.
    Compile {
        #[arg(long)]
        discovery: PathBuf,
        #[arg(long, default_value = "sdet")]
        persona: String,
        /// 환경 기술자 YAML/JSON.
        #[arg(long)]
        env: Option<PathBuf>,
        /// 없으면 표준 출력.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// TestPlan을 프레임워크 코드로 렌더링한다.
    Render {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long)]
        framework: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, env = "TESTFORGE_CONFIG")]
        config: Option<PathBuf>,
    },
    /// 컴파일, 렌더링, 실행을 큐를 통해 끝까지 수행한다.
    Run {
        #[arg(long)]
        discovery: PathBuf,
        #[arg(long, default_value = "sdet")]
        persona: String,
        #[arg(long)]
        framework: String,
        #[arg(long)]
        env: Option<PathBuf>,
        #[arg(long, env = "TESTFORGE_CONFIG")]
        config: Option<PathBuf>,
    },
    /// 등록된 프레임워크 어댑터 목록.
    Frameworks,
    /// 등록된 페르소나 목록.
    Personas,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Compile {
            discovery,
            persona,
            env,
            out,
        } => compile_command(&discovery, &persona, env.as_deref(), out.as_deref()),
        Command::Render {
            plan,
            framework,
            out,
            config,
        } => render_command(&plan, &framework, &out, config.as_deref()).await,
        Command::Run {
            discovery,
            persona,
            framework,
            env,
            config,
        } => run_command(&discovery, &persona, &framework, env.as_deref(), config.as_deref()).await,
        Command::Frameworks => {
            let registry = AdapterRegistry::with_builtin(&OrchestratorConfig::default().render_settings());
            for adapter in registry.iter() {
                println!("{}\t{}", adapter.id(), adapter.display_name());
            }
            Ok(())
        }
        Command::Personas => {
            for persona in PatternLibrary::builtin().personas() {
                println!("{persona}");
            }
            Ok(())
        }
    }
}

fn load_env(path: Option<&Path>) -> anyhow::Result<EnvDescriptor> {
    match path {
        Some(path) => Ok(load_env_from_file(path)?),
        None => Ok(EnvDescriptor::default()),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<OrchestratorConfig> {
    match path {
        Some(path) => Ok(load_config_from_file(path)?),
        None => Ok(OrchestratorConfig::default()),
    }
}

fn compile_command(
    discovery: &Path,
    persona: &str,
    env: Option<&Path>,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let discovery = load_discovery_from_file(discovery)?;
    let env = load_env(env)?;
    let plan = compile(&discovery, &env, persona, &PatternLibrary::builtin())?;
    let yaml = plan_to_yaml(&plan)?;
    match out {
        Some(path) => {
            std::fs::write(path, yaml).with_context(|| format!("플랜 저장 실패: {}", path.display()))?;
            info!(plan = %plan.plan_ref(), count = plan.cases().len(), path = %path.display(), "플랜 저장");
        }
        None => print!("{yaml}"),
    }
    Ok(())
}

async fn render_command(
    plan: &Path,
    framework: &str,
    out: &Path,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let plan = load_plan_from_file(plan).with_context(|| format!("플랜 읽기 실패: {}", plan.display()))?;
    let registry = AdapterRegistry::with_builtin(&config.render_settings());
    let adapter = registry.get(framework)?;
    let output = adapter.render(&plan);
    for failure in &output.failures {
        warn!(scenario = %failure.scenario_id, step = failure.step_index, reason = %failure.reason, "시나리오 렌더링 실패");
    }
    if output.status == RenderStatus::NotImplemented {
        warn!(framework, "코드 생성을 지원하지 않는 프레임워크");
    }
    write_rendered(out, &output).await?;
    info!(
        framework,
        files = output.files.len(),
        count = output.manifest.count,
        out = %out.display(),
        "렌더링 완료"
    );
    Ok(())
}

async fn run_command(
    discovery_path: &Path,
    persona: &str,
    framework: &str,
    env: Option<&Path>,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let discovery = Arc::new(load_discovery_from_file(discovery_path)?);
    let env = load_env(env)?;
    let plan = compile(&discovery, &env, persona, &PatternLibrary::builtin())?;

    let (tx, mut rx) = unbounded_channel();
    let adapters = AdapterRegistry::with_builtin(&config.render_settings());
    let orchestrator = Orchestrator::new(config, adapters, tx);
    let ids = orchestrator.submit(Submission {
        plan,
        framework: framework.to_string(),
        env,
        discovery: Some(discovery),
    })?;
    info!(jobs = ids.len(), framework, persona, "실행 시작");

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::JobQueued { job_id, queue, attempt } => {
                    info!(%job_id, %queue, attempt, "queued")
                }
                EngineEvent::JobStarted { job_id, queue, attempt } => {
                    info!(%job_id, %queue, attempt, "started")
                }
                EngineEvent::JobLog { job_id, line } => println!("[{job_id}] {line}"),
                EngineEvent::JobHealing { job_id, plan, changes } => {
                    info!(%job_id, %plan, changes = ?changes, "healing")
                }
                EngineEvent::JobFinished { job_id, queue, status } => {
                    info!(%job_id, %queue, status = status.label(), "finished")
                }
            }
        }
    });

    // 취소되면 run_until_idle이 실행 중인 작업을 마친 뒤 큐를 정지한다.
    let cancel = CancellationToken::new();
    let halt_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("중단 요청: 모든 큐를 정지합니다");
            halt_token.cancel();
        }
    });

    let jobs = orchestrator.run_until_idle(cancel).await;
    drop(orchestrator);
    let _ = printer.await;

    let mut failed = 0;
    for job in &jobs {
        match &job.status {
            JobStatus::Failed(failure) => {
                failed += 1;
                println!(
                    "{} {} FAILED {:?}: {}",
                    job.id, job.queue, failure.kind, failure.message
                );
            }
            status => println!("{} {} {}", job.id, job.queue, status.label()),
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed}개 작업 실패");
    }
    Ok(())
}
