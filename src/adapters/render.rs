use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use super::{RenderOutput, RenderStatus};
use crate::error::RenderError;
use crate::scenario::{Manifest, RenderedFile, Scenario, Step, StepKind, TestPlan};
use crate::synthesis::Locator;

/// 프레임워크 렌더러가 소비하는 해석된 Step이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Goto(String),
    Click(Locator),
    Fill { locator: Locator, value: String },
    ExpectText(String),
    ExpectVisible(Locator),
    Upload { locator: Locator, path: String },
    Custom(String),
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str, String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("{what}이(가) 없습니다"))
}

/// 모든 어댑터가 공유하는 Step 해석 규칙이다.
pub fn resolve_step(step: &Step) -> Result<Action, String> {
    match step.kind {
        StepKind::Goto => Ok(Action::Goto(required(&step.target, "goto 대상 URL")?.to_string())),
        StepKind::Click => {
            let hint = step.target.as_deref().ok_or("click 대상 힌트가 없습니다")?;
            Ok(Action::Click(Locator::parse(hint)?))
        }
        StepKind::Fill => {
            let locator = match step.target.as_deref() {
                Some(hint) => Locator::parse(hint)?,
                None => Locator::FirstField,
            };
            Ok(Action::Fill {
                locator,
                value: step.value.clone().unwrap_or_default(),
            })
        }
        StepKind::ExpectText => Ok(Action::ExpectText(
            required(&step.value, "expect-text 기대 텍스트")?.to_string(),
        )),
        StepKind::ExpectVisible => {
            let hint = step
                .target
                .as_deref()
                .ok_or("expect-visible 대상 힌트가 없습니다")?;
            Ok(Action::ExpectVisible(Locator::parse(hint)?))
        }
        StepKind::Upload => {
            let locator = match step.target.as_deref() {
                Some(hint) => Locator::parse(hint)?,
                None => Locator::InputType("file".into()),
            };
            let path = required(&step.value, "upload 파일 경로")?.to_string();
            Ok(Action::Upload { locator, path })
        }
        StepKind::Custom => Ok(Action::Custom(
            step.note
                .as_deref()
                .or(step.value.as_deref())
                .or(step.target.as_deref())
                .unwrap_or_default()
                .to_string(),
        )),
    }
}

/// 시나리오 전체를 해석한다. 첫 실패 Step에서 멈춘다.
pub(crate) fn resolve_case(scenario: &Scenario) -> Result<Vec<Action>, RenderError> {
    scenario
        .steps
        .iter()
        .enumerate()
        .map(|(step_index, step)| {
            resolve_step(step).map_err(|reason| RenderError {
                scenario_id: scenario.id.clone(),
                scenario_title: scenario.title.clone(),
                step_index,
                reason,
            })
        })
        .collect()
}

/// 한 페이지에 속한 렌더링 가능한 시나리오 묶음이다.
pub(crate) struct PageCases<'a> {
    pub key: String,
    pub cases: Vec<(&'a Scenario, Vec<Action>)>,
    stem: String,
}

impl PageCases<'_> {
    /// 플랜 안에서 겹치지 않는 파일 이름.
    pub fn file_stem(&self) -> &str {
        &self.stem
    }
}

/// 시나리오를 페이지별로 묶고 해석한다. 실패한 시나리오는 오류 목록으로 분리된다.
///
/// 페이지와 시나리오는 삽입 순서를 유지한다.
pub(crate) fn prepare(plan: &TestPlan) -> (Vec<PageCases<'_>>, Vec<RenderError>) {
    let mut pages: IndexMap<String, Vec<(&Scenario, Vec<Action>)>> = IndexMap::new();
    let mut failures = Vec::new();
    for scenario in plan.cases() {
        match resolve_case(scenario) {
            Ok(actions) => pages
                .entry(scenario.page_key())
                .or_default()
                .push((scenario, actions)),
            Err(err) => failures.push(err),
        }
    }
    let mut taken = HashSet::new();
    let pages = pages
        .into_iter()
        .map(|(key, cases)| {
            let stem = unique_stem(slug(&key), &mut taken);
            PageCases { key, cases, stem }
        })
        .collect();
    (pages, failures)
}

/// 슬러그가 겹치면 `-2`, `-3`을 붙인다. 먼저 나온 페이지가 원래 이름을 가진다.
fn unique_stem(base: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// 공통 매니페스트와 상태를 채워 결과를 만든다. 업로드 Step이 참조하는 픽스처도 함께 넣는다.
pub(crate) fn finish(
    adapter: &str,
    mut files: Vec<RenderedFile>,
    pages: &[PageCases<'_>],
    failures: Vec<RenderError>,
) -> RenderOutput {
    let fixtures = upload_fixtures(pages, &files);
    files.extend(fixtures);
    let manifest = Manifest {
        adapter: adapter.to_string(),
        pages: pages.iter().map(|p| p.key.clone()).collect(),
        count: pages.iter().map(|p| p.cases.len()).sum(),
    };
    let status = if failures.is_empty() {
        RenderStatus::Complete
    } else {
        RenderStatus::Partial
    };
    RenderOutput {
        files,
        manifest,
        status,
        failures,
    }
}

/// 업로드 픽스처 내용. 확장자가 pdf면 최소한의 PDF 문서이다.
const PDF_FIXTURE: &str = "%PDF-1.4\n\
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
2 0 obj << /Type /Pages /Kids [] /Count 0 >> endobj\n\
trailer << /Root 1 0 R >>\n\
%%EOF\n";
const TEXT_FIXTURE: &str = "testforge upload fixture\n";

/// 업로드 Step의 상대 경로마다 픽스처 파일을 한 번씩 만든다.
///
/// 절대 경로, 상위 디렉터리를 가리키는 경로, 이미 렌더링된 경로는 건너뛴다.
fn upload_fixtures(pages: &[PageCases<'_>], rendered: &[RenderedFile]) -> Vec<RenderedFile> {
    let mut seen: HashSet<PathBuf> = rendered.iter().map(|f| f.path.clone()).collect();
    let mut fixtures = Vec::new();
    let uploads = pages
        .iter()
        .flat_map(|page| page.cases.iter())
        .flat_map(|(_, actions)| actions.iter())
        .filter_map(|action| match action {
            Action::Upload { path, .. } => contained(Path::new(path.as_str())),
            _ => None,
        });
    for path in uploads {
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        let content = if is_pdf { PDF_FIXTURE } else { TEXT_FIXTURE };
        if seen.insert(path.clone()) {
            fixtures.push(RenderedFile::new(path, content));
        }
    }
    fixtures
}

/// `./`를 걷어낸 상대 경로. 루트나 상위 디렉터리를 거치면 `None`이다.
fn contained(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    normalized.file_name().is_some().then_some(normalized)
}

/// 경로를 파일 이름용 슬러그로 바꾼다. 루트는 `root`이다.
pub(crate) fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "root".to_string()
    } else {
        trimmed.to_string()
    }
}

/// JS 문자열 리터럴(큰따옴표)로 인코딩한다.
pub(crate) fn js_str(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// 주석 한 줄에 들어갈 수 있도록 개행을 공백으로 바꾼다.
pub(crate) fn one_line(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// CSS 속성 셀렉터를 만든다.
pub(crate) fn attr_selector(tag: &str, attr: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{tag}[{attr}=\"{escaped}\"]")
}

/// 로케이터를 CSS 셀렉터로 표현할 수 있으면 변환한다.
pub(crate) fn css_of(locator: &Locator) -> Option<String> {
    match locator {
        Locator::Name(name) => Some(attr_selector("", "name", name)),
        Locator::InputType(ty) => Some(attr_selector("input", "type", ty)),
        Locator::Placeholder(p) => Some(attr_selector("", "placeholder", p)),
        Locator::FirstField => Some(FIRST_FIELD_CSS.to_string()),
        Locator::FirstOfRole(role) => Some(role.tag().to_string()),
        Locator::Css(css) => Some(css.clone()),
        Locator::Label(_) | Locator::Role { .. } | Locator::Text(_) => None,
    }
}

/// 일반 입력 필드 셀렉터이다.
pub(crate) const FIRST_FIELD_CSS: &str = "input, textarea, select";

/// 플랜 요약 주석 한 줄을 만든다.
pub(crate) fn page_banner(page: &PageCases<'_>) -> String {
    format!("Page: {} ({} tests)", page.key, page.cases.len())
}
