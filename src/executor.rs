pub mod command;

use crate::error::RunnerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub use command::{
    ArtifactLayout, CommandRunner, OutputStream, RunHandle, RunnerEvent, resolve_artifact_root,
    spawn_streaming,
};

/// 렌더링된 산출물을 외부 프레임워크로 실행하는 공통 계약이다.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// 프레임워크 ID.
    fn id(&self) -> &str;

    /// 실행 전 의존성을 준비한다. 기본 구현은 아무것도 하지 않는다.
    async fn install(
        &self,
        _cwd: &Path,
        _env: &HashMap<String, String>,
        _on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<(), RunnerError> {
        Ok(())
    }

    /// 프로세스를 실행하고 종료 코드를 반환한다.
    ///
    /// stdout/stderr의 모든 줄이 `on_line`으로 전달된 뒤에 반환된다.
    /// 0이 아닌 종료 코드는 오류가 아니라 반환값이다.
    async fn run(
        &self,
        cwd: &Path,
        env: &HashMap<String, String>,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<i32, RunnerError>;
}

/// TestRunner를 공유하기 위한 Arc 타입 별칭이다.
pub type SharedRunner = Arc<dyn TestRunner>;

/// 아직 실행을 지원하지 않는 프레임워크용 러너이다.
#[derive(Debug, Clone)]
pub struct StubRunner {
    framework: String,
}

impl StubRunner {
    pub fn new(framework: impl Into<String>) -> Self {
        Self {
            framework: framework.into(),
        }
    }
}

#[async_trait]
impl TestRunner for StubRunner {
    fn id(&self) -> &str {
        &self.framework
    }

    async fn run(
        &self,
        _cwd: &Path,
        _env: &HashMap<String, String>,
        _on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<i32, RunnerError> {
        Err(RunnerError::NotImplemented(self.framework.clone()))
    }
}
