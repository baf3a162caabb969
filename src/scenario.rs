use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Step이 표현하는 추상 동작 종류이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// 페이지 이동.
    Goto,
    /// 요소 클릭.
    Click,
    /// 입력 필드 채우기.
    Fill,
    /// 텍스트 노출 확인.
    ExpectText,
    /// 요소 노출 확인.
    ExpectVisible,
    /// 파일 업로드.
    Upload,
    /// 프레임워크 코드로 옮길 수 없는 자유 형식 메모.
    Custom,
}

impl StepKind {
    /// 직렬화 형식과 동일한 이름을 반환한다.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Goto => "goto",
            StepKind::Click => "click",
            StepKind::Fill => "fill",
            StepKind::ExpectText => "expect-text",
            StepKind::ExpectVisible => "expect-visible",
            StepKind::Upload => "upload",
            StepKind::Custom => "custom",
        }
    }
}

/// Step은 Scenario 내 최소 동작 단위이다. `target`은 프레임워크 로케이터가 아닌 의미 힌트이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// 동작 종류.
    pub kind: StepKind,
    /// 대상 힌트 (`label=…`, `button=…`, URL 등).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// 입력 값, 기대 텍스트 또는 업로드 파일 경로.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// 사람이 읽는 메모.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Step {
    fn with(kind: StepKind, target: Option<String>, value: Option<String>) -> Self {
        Self {
            kind,
            target,
            value,
            note: None,
        }
    }

    /// 페이지 이동 Step을 만든다.
    pub fn goto(url: impl Into<String>) -> Self {
        Self::with(StepKind::Goto, Some(url.into()), None)
    }

    /// 클릭 Step을 만든다.
    pub fn click(target: impl Into<String>) -> Self {
        Self::with(StepKind::Click, Some(target.into()), None)
    }

    /// 입력 Step을 만든다.
    pub fn fill(target: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with(StepKind::Fill, Some(target.into()), Some(value.into()))
    }

    /// 텍스트 확인 Step을 만든다.
    pub fn expect_text(text: impl Into<String>) -> Self {
        Self::with(StepKind::ExpectText, None, Some(text.into()))
    }

    /// 요소 노출 확인 Step을 만든다.
    pub fn expect_visible(target: impl Into<String>) -> Self {
        Self::with(StepKind::ExpectVisible, Some(target.into()), None)
    }

    /// 업로드 Step을 만든다.
    pub fn upload(target: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with(StepKind::Upload, Some(target.into()), Some(path.into()))
    }

    /// 자유 형식 Step을 만든다.
    pub fn custom(note: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Custom,
            target: None,
            value: None,
            note: Some(note.into()),
        }
    }

    /// 대상 힌트를 교체한 새 Step을 반환한다.
    pub fn retargeted(&self, target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..self.clone()
        }
    }
}

/// 시나리오가 겨냥하는 커버리지 유형이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageType {
    Statement,
    Branch,
    Edge,
    Decision,
    Security,
    Regression,
    Accessibility,
    Other,
}

/// 시나리오 위험도이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    Low,
    Medium,
    High,
}

/// Scenario는 독립적으로 실행 가능한 Step 묶음이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// 패턴이 부여한 안정적인 ID.
    pub id: String,
    /// 테스트 제목.
    pub title: String,
    /// 커버리지 유형.
    pub coverage_type: CoverageType,
    /// 설명.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 태그 집합. 정렬된 집합이라 렌더링 결과가 흔들리지 않는다.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// 위험도.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<Risk>,
    /// Step 목록.
    pub steps: Vec<Step>,
}

impl Scenario {
    /// 빈 Step 목록으로 시나리오를 만든다.
    pub fn new(id: impl Into<String>, title: impl Into<String>, coverage_type: CoverageType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            coverage_type,
            description: None,
            tags: BTreeSet::new(),
            risk: None,
            steps: Vec::new(),
        }
    }

    /// 태그를 추가한다.
    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// 위험도를 지정한다.
    pub fn with_risk(mut self, risk: Risk) -> Self {
        self.risk = Some(risk);
        self
    }

    /// 설명을 지정한다.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Step 목록을 지정한다.
    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    /// 보안 큐로 보내야 하는 시나리오인지 확인한다.
    pub fn is_security(&self) -> bool {
        self.coverage_type == CoverageType::Security
    }

    /// 첫 goto Step의 경로를 페이지 키로 사용한다. goto가 없으면 `/`이다.
    pub fn page_key(&self) -> String {
        self.steps
            .iter()
            .find(|step| step.kind == StepKind::Goto)
            .and_then(|step| step.target.as_deref())
            .map(url_path)
            .unwrap_or_else(|| "/".to_string())
    }
}

/// 절대 URL이면 경로만 남기고, 상대 경로는 그대로 사용한다.
pub(crate) fn url_path(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => return normalize_path(trimmed),
    };
    match without_scheme.find('/') {
        Some(idx) => normalize_path(&without_scheme[idx..]),
        None => "/".to_string(),
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// 플랜 요약에 붙는 분석 신뢰도 프로필이다. 달성 커버리지가 아니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<f32>,
    /// 자유 형식 메모.
    #[serde(default)]
    pub notes: Vec<String>,
}

/// 특정 플랜 버전을 가리키는 참조이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanRef {
    /// 플랜 계보 ID.
    pub id: Uuid,
    /// 1부터 시작하는 버전.
    pub version: u32,
}

impl fmt::Display for PlanRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.id, self.version)
    }
}

/// 플랜 식별자. 수정본은 같은 ID의 다음 버전이며 부모 버전을 기록한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanId {
    /// 플랜 계보 ID.
    pub id: Uuid,
    /// 버전.
    pub version: u32,
    /// 이 버전이 파생된 부모 플랜.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<PlanRef>,
}

/// 컴파일 메타데이터이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMeta {
    /// 사용한 페르소나.
    pub persona: String,
    /// 시나리오 수. 항상 `cases.len()`과 같다.
    pub count: usize,
    /// 컴파일 시각. 렌더/실행 시점에는 바뀌지 않는다.
    pub generated_at: DateTime<Utc>,
}

/// 한 번의 컴파일 결과인 불변 테스트 플랜이다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPlan {
    id: PlanId,
    base_url: String,
    cases: Vec<Scenario>,
    meta: PlanMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    coverage: Option<CoverageProfile>,
}

impl TestPlan {
    /// 새 계보의 첫 버전을 만든다.
    pub fn new(
        base_url: impl Into<String>,
        persona: impl Into<String>,
        cases: Vec<Scenario>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let meta = PlanMeta {
            persona: persona.into(),
            count: cases.len(),
            generated_at,
        };
        Self {
            id: PlanId {
                id: Uuid::new_v4(),
                version: 1,
                parent: None,
            },
            base_url: base_url.into(),
            cases,
            meta,
            coverage: None,
        }
    }

    /// 커버리지 프로필을 붙인다. 공유되기 전 빌더 단계에서만 호출한다.
    pub fn with_coverage(mut self, profile: CoverageProfile) -> Self {
        self.coverage = Some(profile);
        self
    }

    /// 같은 계보의 다음 버전을 만든다. 원본은 변경하지 않는다.
    pub fn revise(&self, cases: Vec<Scenario>) -> Self {
        self.derived(
            PlanId {
                id: self.id.id,
                version: self.id.version + 1,
                parent: Some(self.plan_ref()),
            },
            cases,
        )
    }

    /// 일부 시나리오만 담은 새 계보를 만든다. 부모 링크로 원본을 추적한다.
    pub fn fork(&self, cases: Vec<Scenario>) -> Self {
        self.derived(
            PlanId {
                id: Uuid::new_v4(),
                version: 1,
                parent: Some(self.plan_ref()),
            },
            cases,
        )
    }

    fn derived(&self, id: PlanId, cases: Vec<Scenario>) -> Self {
        Self {
            id,
            base_url: self.base_url.clone(),
            meta: PlanMeta {
                persona: self.meta.persona.clone(),
                count: cases.len(),
                generated_at: self.meta.generated_at,
            },
            cases,
            coverage: self.coverage.clone(),
        }
    }

    /// 보안 시나리오와 일반 시나리오를 분리한다. 한쪽만 존재하면 원본을 그대로 돌려준다.
    pub fn split_security(&self) -> (Option<TestPlan>, Option<TestPlan>) {
        let (security, functional): (Vec<Scenario>, Vec<Scenario>) =
            self.cases.iter().cloned().partition(Scenario::is_security);
        match (functional.is_empty(), security.is_empty()) {
            (_, true) => (Some(self.clone()), None),
            (true, false) => (None, Some(self.clone())),
            (false, false) => (Some(self.fork(functional)), Some(self.fork(security))),
        }
    }

    /// 플랜 식별자.
    pub fn id(&self) -> &PlanId {
        &self.id
    }

    /// 현재 버전 참조.
    pub fn plan_ref(&self) -> PlanRef {
        PlanRef {
            id: self.id.id,
            version: self.id.version,
        }
    }

    /// 기준 URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 시나리오 목록.
    pub fn cases(&self) -> &[Scenario] {
        &self.cases
    }

    /// 메타데이터.
    pub fn meta(&self) -> &PlanMeta {
        &self.meta
    }

    /// 커버리지 프로필.
    pub fn coverage(&self) -> Option<&CoverageProfile> {
        self.coverage.as_ref()
    }

    /// 시나리오가 없는지 확인한다.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

/// 어댑터가 렌더링 완성도를 확인하는 데 쓰는 매니페스트이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// 어댑터 ID.
    pub adapter: String,
    /// 렌더링된 페이지 키 목록.
    pub pages: Vec<String>,
    /// 렌더링된 시나리오 수.
    pub count: usize,
}

/// 렌더링 결과 파일이다. `path`는 산출물 루트 기준 상대 경로이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// 상대 경로.
    pub path: PathBuf,
    /// 파일 내용.
    pub content: String,
}

impl RenderedFile {
    /// 새 파일을 만든다.
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// YAML 파일을 읽어 TestPlan으로 역직렬화한다.
pub fn load_plan_from_file(path: &Path) -> anyhow::Result<TestPlan> {
    let mut file = File::open(path)?;
    load_plan_from_reader(&mut file)
}

/// Reader에서 YAML을 읽어 TestPlan을 파싱하고 개수 불변식을 검증한다.
pub fn load_plan_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<TestPlan> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    let plan: TestPlan = serde_yaml::from_str(&buf)?;
    if plan.meta.count != plan.cases.len() {
        anyhow::bail!(
            "플랜 메타 개수({})가 시나리오 수({})와 다릅니다.",
            plan.meta.count,
            plan.cases.len()
        );
    }
    Ok(plan)
}

/// TestPlan을 YAML 문자열로 직렬화한다.
pub fn plan_to_yaml(plan: &TestPlan) -> anyhow::Result<String> {
    Ok(serde_yaml::to_string(plan)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> TestPlan {
        let login = Scenario::new("smoke:/login", "Page loads: /login", CoverageType::Statement)
            .with_steps(vec![Step::goto("/login"), Step::expect_text("Sign in")]);
        let probe = Scenario::new("xss:/login", "Injection probe", CoverageType::Security)
            .with_steps(vec![Step::goto("https://app.example.com/login?next=1")]);
        TestPlan::new("https://app.example.com", "sdet", vec![login, probe], Utc::now())
    }

    #[test]
    fn page_key_uses_path_of_first_goto() {
        let plan = sample_plan();
        assert_eq!(plan.cases()[0].page_key(), "/login");
        assert_eq!(plan.cases()[1].page_key(), "/login");
        let empty = Scenario::new("x", "x", CoverageType::Other);
        assert_eq!(empty.page_key(), "/");
    }

    #[test]
    fn revise_creates_next_version_with_parent_link() {
        let plan = sample_plan();
        let revised = plan.revise(plan.cases()[..1].to_vec());
        assert_eq!(revised.id().id, plan.id().id);
        assert_eq!(revised.id().version, 2);
        assert_eq!(revised.id().parent, Some(plan.plan_ref()));
        assert_eq!(revised.meta().count, 1);
        assert_eq!(revised.meta().generated_at, plan.meta().generated_at);
        assert_eq!(plan.meta().count, 2);
    }

    #[test]
    fn split_security_forks_only_mixed_plans() {
        let plan = sample_plan();
        let (functional, security) = plan.split_security();
        let functional = functional.expect("functional part");
        let security = security.expect("security part");
        assert_ne!(functional.id().id, plan.id().id);
        assert_eq!(functional.id().parent, Some(plan.plan_ref()));
        assert!(security.cases().iter().all(Scenario::is_security));
        assert_eq!(functional.meta().count + security.meta().count, 2);

        let only_functional = plan.fork(plan.cases()[..1].to_vec());
        let (kept, none) = only_functional.split_security();
        assert_eq!(kept.as_ref(), Some(&only_functional));
        assert!(none.is_none());
    }

    #[test]
    fn loading_rejects_stale_counts() {
        let plan = sample_plan();
        let yaml = plan_to_yaml(&plan).expect("serialize");
        let loaded = load_plan_from_reader(&mut yaml.as_bytes()).expect("load");
        assert_eq!(loaded, plan);

        let stale = yaml.replace("count: 2", "count: 5");
        assert!(load_plan_from_reader(&mut stale.as_bytes()).is_err());
    }
}
