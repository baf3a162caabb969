use super::{case_id, PatternInput};
use crate::discovery::{DiscoveredForm, DiscoveredPage, FieldDescriptor};
use crate::scenario::{CoverageType, Risk, Scenario, Step};
use crate::synthesis::{button_locator, field_locator, fill_value, link_locator};

/// 업로드 패턴이 사용하는 고정 픽스처 경로이다.
pub const UPLOAD_FIXTURE: &str = "fixtures/sample.pdf";

/// 페이지당 따라가는 최대 링크 수이다.
const MAX_LINKS_PER_PAGE: usize = 3;

/// 폼이 여러 개인 페이지에서만 폼 순번을 붙인다.
fn forms_of(page: &DiscoveredPage) -> impl Iterator<Item = (Option<usize>, &DiscoveredForm)> {
    let numbered = page.forms.len() > 1;
    page.forms
        .iter()
        .enumerate()
        .map(move |(idx, form)| (numbered.then_some(idx), form))
}

fn title_suffix(index: Option<usize>) -> String {
    index.map(|i| format!(" (form {})", i + 1)).unwrap_or_default()
}

fn submit_step(form: &DiscoveredForm) -> Step {
    Step::click(button_locator(form.submit.as_deref()).to_string())
}

/// 페이지 진입 후 제목이나 첫 헤딩이 보이는지 확인한다.
pub fn page_smoke(input: &PatternInput<'_>) -> Vec<Scenario> {
    input
        .discovery
        .pages
        .iter()
        .map(|page| {
            let mut steps = vec![Step::goto(&page.path)];
            if let Some(landmark) = page.landmark() {
                steps.push(Step::expect_text(landmark));
            }
            Scenario::new(
                case_id("page-smoke", &page.path, None),
                format!("Page loads: {}", page.path),
                CoverageType::Statement,
            )
            .tagged(["smoke"])
            .with_risk(Risk::Low)
            .with_steps(steps)
        })
        .collect()
}

/// 모든 필드를 채우고 제출한다.
pub fn form_happy_path(input: &PatternInput<'_>) -> Vec<Scenario> {
    let mut cases = Vec::new();
    for page in &input.discovery.pages {
        for (index, form) in forms_of(page) {
            if form.fields.is_empty() {
                continue;
            }
            let mut steps = vec![Step::goto(&page.path)];
            steps.extend(form.fields.iter().map(fill_or_upload));
            steps.push(submit_step(form));
            cases.push(
                Scenario::new(
                    case_id("form-happy-path", &page.path, index),
                    format!("Submit form on {}{}", page.path, title_suffix(index)),
                    CoverageType::Branch,
                )
                .with_description("Fills every discovered field with a plausible value and submits.")
                .tagged(["form", "happy-path"])
                .with_risk(Risk::Medium)
                .with_steps(steps),
            );
        }
    }
    cases
}

fn fill_or_upload(field: &FieldDescriptor) -> Step {
    let target = field_locator(field).to_string();
    if field.is_file() {
        Step::upload(target, UPLOAD_FIXTURE)
    } else {
        Step::fill(target, fill_value(field))
    }
}

/// 비어 있는 채로 제출한 뒤 필수 필드가 그대로 남아 있는지 확인한다.
pub fn required_validation(input: &PatternInput<'_>) -> Vec<Scenario> {
    let mut cases = Vec::new();
    for page in &input.discovery.pages {
        for (index, form) in forms_of(page) {
            let required: Vec<&FieldDescriptor> = form
                .fields
                .iter()
                .filter(|f| f.required && !f.is_file())
                .collect();
            if required.is_empty() {
                continue;
            }
            let mut steps = vec![Step::goto(&page.path), submit_step(form)];
            steps.extend(
                required
                    .iter()
                    .map(|f| Step::expect_visible(field_locator(f).to_string())),
            );
            cases.push(
                Scenario::new(
                    case_id("required-validation", &page.path, index),
                    format!("Required fields block empty submit on {}{}", page.path, title_suffix(index)),
                    CoverageType::Edge,
                )
                .tagged(["form", "validation"])
                .with_risk(Risk::Medium)
                .with_steps(steps),
            );
        }
    }
    cases
}

/// 파일 입력마다 픽스처를 올리고 제출한다.
pub fn file_upload(input: &PatternInput<'_>) -> Vec<Scenario> {
    let mut cases = Vec::new();
    for page in &input.discovery.pages {
        for (index, form) in forms_of(page) {
            let uploads: Vec<Step> = form
                .fields
                .iter()
                .filter(|f| f.is_file())
                .map(|f| Step::upload(field_locator(f).to_string(), UPLOAD_FIXTURE))
                .collect();
            if uploads.is_empty() {
                continue;
            }
            let mut steps = vec![Step::goto(&page.path)];
            steps.extend(uploads);
            steps.push(submit_step(form));
            cases.push(
                Scenario::new(
                    case_id("file-upload", &page.path, index),
                    format!("Upload a file on {}{}", page.path, title_suffix(index)),
                    CoverageType::Edge,
                )
                .tagged(["form", "upload"])
                .with_risk(Risk::Medium)
                .with_steps(steps),
            );
        }
    }
    cases
}

/// 페이지의 앞쪽 링크를 따라가고, 도착 페이지를 알고 있으면 그 제목을 확인한다.
pub fn link_navigation(input: &PatternInput<'_>) -> Vec<Scenario> {
    let mut cases = Vec::new();
    for page in &input.discovery.pages {
        for (index, link) in page.links.iter().take(MAX_LINKS_PER_PAGE).enumerate() {
            let text = link.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
            let mut steps = vec![Step::goto(&page.path)];
            match text {
                Some(_) => steps.push(Step::click(link_locator(text).to_string())),
                None => steps.push(Step::goto(&link.href)),
            }
            if let Some(landmark) = input.discovery.page(&link.href).and_then(|p| p.landmark()) {
                steps.push(Step::expect_text(landmark));
            }
            cases.push(
                Scenario::new(
                    case_id("link-navigation", &page.path, Some(index)),
                    format!("Navigate from {} to {}", page.path, text.unwrap_or(&link.href)),
                    CoverageType::Decision,
                )
                .tagged(["navigation"])
                .with_risk(Risk::Low)
                .with_steps(steps),
            );
        }
    }
    cases
}

/// 라벨이 있는 필드가 라벨로 찾아지는지 확인한다.
pub fn labelled_fields(input: &PatternInput<'_>) -> Vec<Scenario> {
    input
        .discovery
        .pages
        .iter()
        .filter_map(|page| {
            let checks: Vec<Step> = page
                .forms
                .iter()
                .flat_map(|form| form.fields.iter())
                .filter(|f| f.label.as_deref().is_some_and(|l| !l.trim().is_empty()))
                .map(|f| Step::expect_visible(field_locator(f).to_string()))
                .collect();
            if checks.is_empty() {
                return None;
            }
            let mut steps = vec![Step::goto(&page.path)];
            steps.extend(checks);
            Some(
                Scenario::new(
                    case_id("labelled-fields", &page.path, None),
                    format!("Fields are reachable by label on {}", page.path),
                    CoverageType::Accessibility,
                )
                .tagged(["a11y"])
                .with_risk(Risk::Low)
                .with_steps(steps),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoveredLink, Discovery, EnvDescriptor};
    use crate::scenario::StepKind;

    fn login_discovery() -> Discovery {
        Discovery {
            base_url: None,
            pages: vec![
                DiscoveredPage {
                    path: "/login".into(),
                    title: Some("Sign in".into()),
                    forms: vec![DiscoveredForm {
                        fields: vec![
                            FieldDescriptor {
                                label: Some("Email Address".into()),
                                required: true,
                                ..Default::default()
                            },
                            FieldDescriptor {
                                name: Some("avatar".into()),
                                field_type: Some("file".into()),
                                ..Default::default()
                            },
                        ],
                        submit: Some("Log in".into()),
                        ..Default::default()
                    }],
                    links: vec![
                        DiscoveredLink {
                            href: "/signup".into(),
                            text: Some("Create account".into()),
                        },
                        DiscoveredLink {
                            href: "/help".into(),
                            text: None,
                        },
                    ],
                    ..Default::default()
                },
                DiscoveredPage {
                    path: "/signup".into(),
                    headings: vec!["Create your account".into()],
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn happy_path_fills_fields_and_submits() {
        let discovery = login_discovery();
        let env = EnvDescriptor::default();
        let cases = form_happy_path(&PatternInput {
            discovery: &discovery,
            env: &env,
        });
        assert_eq!(cases.len(), 1);
        let steps = &cases[0].steps;
        assert_eq!(steps[0], Step::goto("/login"));
        assert_eq!(steps[1], Step::fill("label=Email Address", "qa+auto@example.com"));
        assert_eq!(steps[2], Step::upload("name=avatar", UPLOAD_FIXTURE));
        assert_eq!(steps[3], Step::click("button=Log in"));
    }

    #[test]
    fn link_navigation_asserts_known_targets() {
        let discovery = login_discovery();
        let env = EnvDescriptor::default();
        let cases = link_navigation(&PatternInput {
            discovery: &discovery,
            env: &env,
        });
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].steps[1], Step::click("link=Create account"));
        assert_eq!(cases[0].steps[2], Step::expect_text("Create your account"));
        assert_eq!(cases[1].steps[1], Step::goto("/help"));
        assert_eq!(cases[1].steps.len(), 2);
        assert_eq!(cases[1].page_key(), "/login");
    }

    #[test]
    fn validation_skips_forms_without_required_fields() {
        let mut discovery = login_discovery();
        let env = EnvDescriptor::default();
        let cases = required_validation(&PatternInput {
            discovery: &discovery,
            env: &env,
        });
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].steps.last().map(|s| s.kind), Some(StepKind::ExpectVisible));

        discovery.pages[0].forms[0].fields[0].required = false;
        assert!(required_validation(&PatternInput {
            discovery: &discovery,
            env: &env,
        })
        .is_empty());
    }
}
