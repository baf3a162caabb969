use chrono::{DateTime, Utc};
use tracing::debug;

use crate::discovery::{Discovery, EnvDescriptor};
use crate::error::ConfigError;
use crate::patterns::{PatternInput, PatternLibrary};
use crate::scenario::{CoverageProfile, CoverageType, Scenario, TestPlan};

/// 페르소나 묶음을 실행해 하나의 TestPlan으로 합친다. 생성 시각은 지금이다.
pub fn compile(
    discovery: &Discovery,
    env: &EnvDescriptor,
    persona: &str,
    library: &PatternLibrary,
) -> Result<TestPlan, ConfigError> {
    compile_at(discovery, env, persona, library, Utc::now())
}

/// `generated_at`을 지정해 컴파일한다.
///
/// 환경 기술자의 플레이스홀더는 여기서 모두 치환되며, 실패하면 패턴을 실행하지 않는다.
pub fn compile_at(
    discovery: &Discovery,
    env: &EnvDescriptor,
    persona: &str,
    library: &PatternLibrary,
    generated_at: DateTime<Utc>,
) -> Result<TestPlan, ConfigError> {
    let bundle = library.bundle(persona)?;
    let env = env.resolve()?;
    let input = PatternInput {
        discovery,
        env: &env,
    };

    let mut cases = Vec::new();
    for pattern in bundle {
        let produced = pattern.run(&input);
        debug!(pattern = pattern.name, count = produced.len(), "패턴 실행");
        cases.extend(produced);
    }

    let base_url = env
        .base_url
        .clone()
        .or_else(|| discovery.base_url.clone().filter(|u| !u.trim().is_empty()))
        .unwrap_or_else(|| "/".to_string());

    let profile = coverage_profile(&cases, bundle.len());
    Ok(TestPlan::new(base_url, persona, cases, generated_at).with_coverage(profile))
}

/// 생성된 시나리오의 커버리지 유형 분포로 분석 신뢰도 요약을 만든다.
fn coverage_profile(cases: &[Scenario], patterns: usize) -> CoverageProfile {
    let share = |kind: CoverageType| -> Option<f32> {
        if cases.is_empty() {
            return None;
        }
        let hits = cases.iter().filter(|c| c.coverage_type == kind).count();
        (hits > 0).then(|| (hits as f32 / cases.len() as f32 * 100.0).round())
    };
    CoverageProfile {
        statement: share(CoverageType::Statement),
        branch: share(CoverageType::Branch),
        decision: share(CoverageType::Decision),
        edge: share(CoverageType::Edge),
        security: share(CoverageType::Security),
        notes: vec![format!("{} scenarios from {patterns} patterns", cases.len())],
    }
}
