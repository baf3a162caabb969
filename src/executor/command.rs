use super::TestRunner;
use crate::error::RunnerError;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// 러너 이벤트 채널 용량이다. 소비자가 느리면 파이프 읽기가 함께 멈춘다.
const CHANNEL_CAPACITY: usize = 256;

/// 프로세스 출력 스트림 구분이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "STDOUT",
            OutputStream::Stderr => "STDERR",
        }
    }
}

/// 러너 출력 채널 이벤트이다. `Exited`가 항상 마지막이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerEvent {
    /// 한 줄 출력.
    Line { stream: OutputStream, line: String },
    /// 프로세스 종료. 코드가 없으면(시그널 종료) 1이다.
    Exited { code: i32 },
}

/// 실행 중인 프로세스의 단일 소비자 출력 채널이다.
///
/// 핸들을 버리면 감독 태스크가 취소되어 자식 프로세스가 종료된다.
pub struct RunHandle {
    events: mpsc::Receiver<RunnerEvent>,
    _guard: DropGuard,
}

impl RunHandle {
    /// 다음 이벤트를 기다린다. `Exited` 이후에는 `None`이다.
    pub async fn next(&mut self) -> Option<RunnerEvent> {
        self.events.recv().await
    }

    /// 모든 줄을 콜백으로 넘기고 종료 코드를 반환한다.
    pub async fn drive(mut self, on_line: &mut (dyn for<'a> FnMut(&'a str) + Send)) -> i32 {
        while let Some(event) = self.next().await {
            match event {
                RunnerEvent::Line { line, .. } => on_line(&line),
                RunnerEvent::Exited { code } => return code,
            }
        }
        1
    }
}

/// 프로세스를 시작하고 출력 채널을 돌려준다.
///
/// 감독 태스크는 자식 종료와 두 파이프의 소진을 모두 기다린 뒤 `Exited`를 보낸다.
pub fn spawn_streaming(mut command: Command) -> std::io::Result<RunHandle> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = command.spawn()?;

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let forwarders: Vec<_> = [
        child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(pipe_forwarder(pipe, tx.clone(), OutputStream::Stdout))),
        child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(pipe_forwarder(pipe, tx.clone(), OutputStream::Stderr))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        let status = tokio::select! {
            status = child.wait() => status.ok(),
            _ = token.cancelled() => {
                warn!("러너 프로세스를 강제 종료합니다.");
                let _ = child.kill().await;
                for handle in &forwarders {
                    handle.abort();
                }
                return;
            }
        };
        for handle in forwarders {
            let _ = handle.await;
        }
        let code = status.and_then(|s| s.code()).unwrap_or(1);
        debug!(code, "러너 프로세스 종료");
        let _ = tx.send(RunnerEvent::Exited { code }).await;
    });

    Ok(RunHandle {
        events: rx,
        _guard: cancel.drop_guard(),
    })
}

/// 프로세스 파이프를 읽어 줄 단위 이벤트로 중계한다.
async fn pipe_forwarder<R>(reader: R, sender: mpsc::Sender<RunnerEvent>, stream: OutputStream)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new());
    while let Some(line_result) = lines.next().await {
        match line_result {
            Ok(line) => {
                if sender.send(RunnerEvent::Line { stream, line }).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = sender
                    .send(RunnerEvent::Line {
                        stream,
                        line: format!("{} 읽기 오류: {err}", stream.as_str()),
                    })
                    .await;
                // 나머지 출력은 버리되 파이프는 끝까지 비워 자식이 막히지 않게 한다.
                let mut rest = lines.into_inner();
                let _ = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await;
                return;
            }
        }
    }
}

/// 러너 인자 생성에 쓰이는 산출물 위치이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// 프레임워크 설정 파일이 있는 디렉터리.
    pub root: PathBuf,
}

/// 후보 경로 중 처음 존재하는 디렉터리를 고른다. 없으면 마지막 후보이다.
pub fn resolve_artifact_root(cwd: &Path, candidates: &[PathBuf]) -> PathBuf {
    let paths: Vec<PathBuf> = candidates.iter().map(|c| cwd.join(c)).collect();
    paths
        .iter()
        .find(|p| p.is_dir())
        .or_else(|| paths.last())
        .cloned()
        .unwrap_or_else(|| cwd.to_path_buf())
}

/// 플랫폼별 npx 실행 파일 이름이다.
pub fn npx_program() -> &'static str {
    if cfg!(target_os = "windows") {
        "npx.cmd"
    } else {
        "npx"
    }
}

fn npm_program() -> &'static str {
    if cfg!(target_os = "windows") {
        "npm.cmd"
    } else {
        "npm"
    }
}

/// 외부 명령으로 테스트를 실행하는 러너이다.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    framework: String,
    program: String,
    candidates: Vec<PathBuf>,
    build_args: fn(&ArtifactLayout) -> Vec<String>,
    install: bool,
}

impl CommandRunner {
    /// npx로 실행하는 러너를 만든다.
    ///
    /// 산출물 후보는 `<cwd>/<id>`, `<cwd>/generated/<id>`, `<cwd>` 순서이다.
    pub fn npx(framework: impl Into<String>, build_args: fn(&ArtifactLayout) -> Vec<String>) -> Self {
        let framework = framework.into();
        let candidates = vec![
            PathBuf::from(&framework),
            Path::new("generated").join(&framework),
            PathBuf::from("."),
        ];
        Self {
            framework,
            program: npx_program().to_string(),
            candidates,
            build_args,
            install: false,
        }
    }

    /// 실행 파일을 교체한다.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// `node_modules`가 없을 때 `npm install`을 먼저 실행할지 지정한다.
    pub fn with_install(mut self, enabled: bool) -> Self {
        self.install = enabled;
        self
    }

    fn layout(&self, cwd: &Path) -> Result<ArtifactLayout, RunnerError> {
        if !cwd.is_dir() {
            return Err(RunnerError::WorkingDirectory(cwd.to_path_buf()));
        }
        Ok(ArtifactLayout {
            root: resolve_artifact_root(cwd, &self.candidates),
        })
    }
}

#[async_trait]
impl TestRunner for CommandRunner {
    fn id(&self) -> &str {
        &self.framework
    }

    async fn install(
        &self,
        cwd: &Path,
        env: &HashMap<String, String>,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<(), RunnerError> {
        let layout = self.layout(cwd)?;
        if !self.install || layout.root.join("node_modules").is_dir() {
            return Ok(());
        }
        info!(framework = %self.framework, root = %layout.root.display(), "의존성 설치");
        let mut command = Command::new(npm_program());
        command
            .args(["install", "--no-audit", "--no-fund"])
            .current_dir(&layout.root)
            .envs(env);
        let handle = spawn_streaming(command).map_err(|source| RunnerError::Spawn {
            program: npm_program().to_string(),
            source,
        })?;
        match handle.drive(on_line).await {
            0 => Ok(()),
            code => Err(RunnerError::Install { code }),
        }
    }

    async fn run(
        &self,
        cwd: &Path,
        env: &HashMap<String, String>,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<i32, RunnerError> {
        let layout = self.layout(cwd)?;
        let args = (self.build_args)(&layout);
        info!(
            framework = %self.framework,
            program = %self.program,
            root = %layout.root.display(),
            ?args,
            "러너 시작"
        );
        let mut command = Command::new(&self.program);
        command.args(&args).current_dir(&layout.root).envs(env);
        let handle = spawn_streaming(command).map_err(|source| RunnerError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        Ok(handle.drive(on_line).await)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn mixed_output(_: &ArtifactLayout) -> Vec<String> {
        vec!["-c".into(), "echo one; echo two >&2; echo three; exit 3".into()]
    }

    fn counting(_: &ArtifactLayout) -> Vec<String> {
        vec!["-c".into(), "i=1; while [ $i -le 200 ]; do echo line-$i; i=$((i+1)); done".into()]
    }

    fn self_kill(_: &ArtifactLayout) -> Vec<String> {
        vec!["-c".into(), "echo bye; kill -9 $$".into()]
    }

    fn sleeper(_: &ArtifactLayout) -> Vec<String> {
        vec!["-c".into(), "echo $$ > child.pid; exec sleep 30".into()]
    }

    fn print_root(_: &ArtifactLayout) -> Vec<String> {
        vec!["-c".into(), "pwd; echo $TM_BASE_URL".into()]
    }

    fn sh(build_args: fn(&ArtifactLayout) -> Vec<String>) -> CommandRunner {
        CommandRunner::npx("sh-test", build_args).with_program("sh")
    }

    async fn collect(runner: &CommandRunner, cwd: &Path) -> (Result<i32, RunnerError>, Vec<String>) {
        let mut lines = Vec::new();
        let mut env = HashMap::new();
        env.insert("TM_BASE_URL".to_string(), "http://localhost:4173".to_string());
        let result = runner
            .run(cwd, &env, &mut |line: &str| lines.push(line.to_string()))
            .await;
        (result, lines)
    }

    /// 두 스트림의 모든 줄을 받은 뒤 종료 코드를 그대로 반환한다.
    #[tokio::test]
    async fn streams_both_pipes_and_returns_exit_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (result, lines) = collect(&sh(mixed_output), dir.path()).await;
        assert_eq!(result.expect("run"), 3);
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(sorted, ["one", "three", "two"]);
        let one = lines.iter().position(|l| l == "one");
        let three = lines.iter().position(|l| l == "three");
        assert!(one < three);
    }

    /// 같은 스트림 안에서는 줄 순서가 유지된다.
    #[tokio::test]
    async fn keeps_per_stream_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (result, lines) = collect(&sh(counting), dir.path()).await;
        assert_eq!(result.expect("run"), 0);
        let expected: Vec<String> = (1..=200).map(|i| format!("line-{i}")).collect();
        assert_eq!(lines, expected);
    }

    /// 시그널로 종료되어 코드가 없으면 1을 반환한다.
    #[tokio::test]
    async fn signal_exit_maps_to_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (result, lines) = collect(&sh(self_kill), dir.path()).await;
        assert_eq!(result.expect("run"), 1);
        assert_eq!(lines, ["bye"]);
    }

    /// 실행 파일이 없으면 종료 코드가 아니라 Spawn 오류이다.
    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = sh(mixed_output).with_program("testforge-definitely-missing-binary");
        let (result, _) = collect(&runner, dir.path()).await;
        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
    }

    /// 작업 디렉터리가 없으면 WorkingDirectory 오류이다.
    #[tokio::test]
    async fn missing_cwd_is_rejected() {
        let (result, _) = collect(&sh(mixed_output), Path::new("/nonexistent/testforge")).await;
        assert!(matches!(result, Err(RunnerError::WorkingDirectory(_))));
    }

    /// 존재하는 후보 디렉터리에서 실행하고 환경 변수를 전달한다.
    #[tokio::test]
    async fn runs_inside_resolved_root_with_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("generated").join("sh-test");
        std::fs::create_dir_all(&nested).expect("mkdir");
        let (result, lines) = collect(&sh(print_root), dir.path()).await;
        assert_eq!(result.expect("run"), 0);
        let reported = std::fs::canonicalize(&lines[0]).expect("canonical pwd");
        assert_eq!(reported, std::fs::canonicalize(&nested).expect("canonical nested"));
        assert_eq!(lines[1], "http://localhost:4173");
    }

    #[test]
    fn artifact_root_falls_back_to_last_candidate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let candidates = [PathBuf::from("a"), PathBuf::from("b")];
        assert_eq!(resolve_artifact_root(dir.path(), &candidates), dir.path().join("b"));
        std::fs::create_dir(dir.path().join("a")).expect("mkdir");
        assert_eq!(resolve_artifact_root(dir.path(), &candidates), dir.path().join("a"));
    }

    /// 실행 future를 버리면 자식 프로세스가 실제로 종료된다.
    #[tokio::test]
    async fn dropping_run_future_kills_child() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = sh(sleeper);
        let outcome =
            tokio::time::timeout(Duration::from_millis(300), collect(&runner, dir.path())).await;
        assert!(outcome.is_err());

        let pid = std::fs::read_to_string(dir.path().join("child.pid")).expect("pid file");
        let pid = pid.trim().to_string();
        assert!(!pid.is_empty());
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let alive = Command::new("kill")
                .args(["-0", &pid])
                .stderr(Stdio::null())
                .status()
                .await
                .expect("kill -0")
                .success();
            if !alive {
                break;
            }
            assert!(Instant::now() < deadline, "child {pid} still alive");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Exited 이후에는 이벤트가 오지 않는다.
    #[tokio::test]
    async fn exited_is_terminal_event() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo a; echo b >&2"]);
        let mut handle = spawn_streaming(command).expect("spawn");
        let mut events = Vec::new();
        while let Some(event) = handle.next().await {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert_eq!(events.last(), Some(&RunnerEvent::Exited { code: 0 }));
    }
}
