use std::path::PathBuf;

/// 컴파일 시점에 즉시 실패해야 하는 구성 오류를 표현한다.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 등록되지 않은 페르소나를 선택한 경우이다.
    #[error("알 수 없는 페르소나입니다: {0}")]
    UnknownPersona(String),
    /// 등록되지 않은 프레임워크 어댑터를 요청한 경우이다.
    #[error("알 수 없는 프레임워크입니다: {0}")]
    UnknownFramework(String),
    /// 필수 환경 값이 비었거나 치환되지 않은 경우이다.
    #[error("필수 환경 값이 누락되었습니다: {field} ({reason})")]
    MissingEnv { field: String, reason: String },
    /// 설정 파일을 읽거나 파싱하지 못한 경우이다.
    #[error("설정 파일을 읽을 수 없습니다: {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// 단일 시나리오 렌더링 실패를 표현한다. 다른 시나리오 렌더링에는 영향을 주지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("시나리오 '{scenario_title}'({scenario_id})의 {step_index}번째 Step 렌더링 실패: {reason}")]
pub struct RenderError {
    /// 실패한 시나리오 ID.
    pub scenario_id: String,
    /// 실패한 시나리오 제목.
    pub scenario_title: String,
    /// 0 기반 Step 위치.
    pub step_index: usize,
    /// 실패 사유.
    pub reason: String,
}

/// 러너 프로세스를 시작하지 못한 경우를 표현한다. 비정상 종료 코드와는 구분된다.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// 작업 디렉터리가 존재하지 않는다.
    #[error("작업 디렉터리가 유효하지 않습니다: {0}")]
    WorkingDirectory(PathBuf),
    /// 프레임워크 실행 파일을 시작하지 못했다.
    #[error("프로세스 실행 실패: {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// 어댑터가 아직 실행을 지원하지 않는다.
    #[error("{0} 러너는 아직 구현되지 않았습니다.")]
    NotImplemented(String),
    /// 사전 설치 단계가 실패했다.
    #[error("의존성 설치 실패 (종료 코드 {code})")]
    Install { code: i32 },
}

/// 셀프 힐링 시도가 실패한 사유를 표현한다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HealError {
    /// Discovery 정보 없이 제출된 작업이다.
    #[error("Discovery 정보가 없어 로케이터를 재합성할 수 없습니다.")]
    MissingDiscovery,
    /// 실패 로그에서 대상 로케이터를 특정하지 못했다.
    #[error("실패 로그에서 대상 로케이터를 특정할 수 없습니다.")]
    NoEvidence,
    /// 근거가 서로 다른 로케이터 여러 개와 맞는다.
    #[error("실패 근거가 여러 로케이터와 일치합니다: {0}")]
    Ambiguous(String),
    /// 실패한 Step에 적용할 대체 로케이터가 없다.
    #[error("대체 로케이터가 없습니다: {0}")]
    NoAlternative(String),
}

/// 오케스트레이터 제출/큐 조작 오류이다.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 구성 오류가 그대로 전파된 경우이다.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// 닫힌 큐에 작업을 넣으려 했다.
    #[error("{0} 큐가 이미 종료되었습니다.")]
    QueueClosed(String),
}
