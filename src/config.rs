use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adapters::RenderSettings;
use crate::engine::ExecutionContext;
use crate::error::ConfigError;

/// 큐 하나의 워커 수와 지연 시간이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 동시에 실행할 워커 수. 0이면 1로 본다.
    pub concurrency: usize,
    /// 작업을 꺼낼 수 있게 되기까지의 지연(초).
    pub delay_secs: u64,
}

impl QueueConfig {
    pub fn new(concurrency: usize, delay_secs: u64) -> Self {
        Self {
            concurrency,
            delay_secs,
        }
    }

    /// 실제로 띄울 워커 수.
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

/// 큐별 설정 묶음이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub run: QueueConfig,
    pub healing: QueueConfig,
    pub security: QueueConfig,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            run: QueueConfig::new(2, 0),
            healing: QueueConfig::new(1, 0),
            security: QueueConfig::new(1, 0),
        }
    }
}

/// 오케스트레이터 설정이다. YAML 파일에서 읽으며 빠진 항목은 기본값을 쓴다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// 작업별 렌더링 디렉터리가 만들어지는 루트.
    pub work_root: PathBuf,
    /// 작업 종료 후 렌더링 디렉터리를 남길지 여부.
    pub keep_artifacts: bool,
    /// 러너 프로세스 강제 종료 시간(초).
    pub job_timeout_secs: u64,
    /// 프레임워크 설정에 들어가는 테스트당 타임아웃(ms).
    pub test_timeout_ms: u64,
    /// 실패 정보에 남길 마지막 로그 줄 수.
    pub log_tail_lines: usize,
    /// 실행 전 `npm install` 여부.
    pub install_dependencies: bool,
    /// 프레임워크 JSON 리포트 파일 이름.
    pub report_file: String,
    pub queues: QueuesConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("testforge"),
            keep_artifacts: false,
            job_timeout_secs: 900,
            test_timeout_ms: 30_000,
            log_tail_lines: 200,
            install_dependencies: false,
            report_file: "report.json".to_string(),
            queues: QueuesConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// 작업 타임아웃.
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// 어댑터에 넘길 렌더링 설정.
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            test_timeout_ms: self.test_timeout_ms,
            report_file: self.report_file.clone(),
            install_dependencies: self.install_dependencies,
        }
    }
}

/// YAML 설정 파일을 읽는다. 본문의 `${VAR}`는 환경 변수로 치환된다.
pub fn load_config_from_file(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    load_config_from_str(&raw, &path.display().to_string())
}

/// 문자열에서 설정을 읽는다. `origin`은 오류 메시지에 쓰인다.
pub fn load_config_from_str(raw: &str, origin: &str) -> Result<OrchestratorConfig, ConfigError> {
    let expanded = ExecutionContext::new().expand_required(raw, origin)?;
    serde_yaml::from_str(&expanded).map_err(|e| ConfigError::Load {
        path: PathBuf::from(origin),
        reason: e.to_string(),
    })
}
