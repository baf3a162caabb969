//! TestPlan을 프레임워크별 테스트 코드로 렌더링하는 어댑터 모음이다.

pub mod appium;
pub mod cucumber;
pub mod cypress;
pub mod playwright;
mod render;
pub mod xctest;

use indexmap::IndexMap;
use std::sync::Arc;

use crate::error::{ConfigError, RenderError};
use crate::executor::SharedRunner;
use crate::scenario::{Manifest, RenderedFile, TestPlan};
use crate::synthesis::Locator;

pub use render::{Action, resolve_step};

/// 렌더링 결과 상태이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// 모든 시나리오가 렌더링되었다.
    Complete,
    /// 일부 시나리오가 RenderError로 제외되었다.
    Partial,
    /// 어댑터가 아직 코드 생성을 지원하지 않는다.
    NotImplemented,
}

/// `render`의 결과물이다.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// 산출물 루트 기준 파일 목록.
    pub files: Vec<RenderedFile>,
    /// 렌더링 요약.
    pub manifest: Manifest,
    pub status: RenderStatus,
    /// 제외된 시나리오별 오류.
    pub failures: Vec<RenderError>,
}

/// 프레임워크 설정 파일에 들어가는 값이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// 프레임워크 단위 테스트 타임아웃(ms).
    pub test_timeout_ms: u64,
    /// JSON 리포트 파일 이름.
    pub report_file: String,
    /// 러너 실행 전에 `npm install`을 수행할지 여부.
    pub install_dependencies: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            test_timeout_ms: 30_000,
            report_file: "report.json".to_string(),
            install_dependencies: false,
        }
    }
}

/// 프레임워크 어댑터가 제공해야 하는 기능 집합이다.
pub trait FrameworkAdapter: Send + Sync {
    /// 레지스트리 키.
    fn id(&self) -> &'static str;

    /// 사람이 읽는 이름.
    fn display_name(&self) -> &'static str;

    /// 플랜을 파일 목록으로 렌더링한다. 같은 플랜이면 항상 같은 바이트를 만든다.
    fn render(&self, plan: &TestPlan) -> RenderOutput;

    /// 렌더링 결과를 실행할 러너.
    fn runner(&self) -> SharedRunner;

    /// 로케이터를 프레임워크 표현식으로 바꾼다.
    fn locator_expression(&self, locator: &Locator) -> String;
}

/// 프레임워크 ID → 어댑터 레지스트리이다.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: IndexMap<String, Arc<dyn FrameworkAdapter>>,
}

impl AdapterRegistry {
    /// 빈 레지스트리를 만든다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 어댑터 다섯 가지를 등록한다.
    pub fn with_builtin(settings: &RenderSettings) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(playwright::PlaywrightAdapter::new(settings.clone())));
        registry.register(Arc::new(cypress::CypressAdapter::new(settings.clone())));
        registry.register(Arc::new(cucumber::CucumberAdapter::new(settings.clone())));
        registry.register(Arc::new(appium::AppiumAdapter::new(settings.clone())));
        registry.register(Arc::new(xctest::XcTestAdapter));
        registry
    }

    /// 어댑터를 등록한다. 같은 ID는 교체된다.
    pub fn register(&mut self, adapter: Arc<dyn FrameworkAdapter>) {
        self.adapters.insert(adapter.id().to_string(), adapter);
    }

    /// ID로 어댑터를 찾는다.
    pub fn get(&self, id: &str) -> Result<Arc<dyn FrameworkAdapter>, ConfigError> {
        self.adapters
            .get(id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownFramework(id.to_string()))
    }

    /// 등록 순서대로 어댑터를 순회한다.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn FrameworkAdapter>> {
        self.adapters.values()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.adapters.keys()).finish()
    }
}
