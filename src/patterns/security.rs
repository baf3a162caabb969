use super::{case_id, PatternInput};
use crate::scenario::{CoverageType, Risk, Scenario, Step};
use crate::synthesis::{button_locator, field_locator};

/// (태그, 페이로드) 목록이다.
const PAYLOADS: [(&str, &str); 2] = [
    ("xss", "<script>alert(1)</script>"),
    ("sqli", "' OR '1'='1"),
];

/// 텍스트 필드에 주입 페이로드를 넣고 제출한다. 보안 큐로 분리된다.
pub fn injection_probe(input: &PatternInput<'_>) -> Vec<Scenario> {
    let mut cases = Vec::new();
    for page in &input.discovery.pages {
        for (form_index, form) in page.forms.iter().enumerate() {
            let targets: Vec<String> = form
                .fields
                .iter()
                .filter(|f| f.is_textual() && !f.is_file())
                .map(|f| field_locator(f).to_string())
                .collect();
            if targets.is_empty() {
                continue;
            }
            for (tag, payload) in PAYLOADS {
                let mut steps = vec![Step::goto(&page.path)];
                steps.extend(targets.iter().map(|t| Step::fill(t.as_str(), payload)));
                steps.push(Step::click(button_locator(form.submit.as_deref()).to_string()));
                steps.push(Step::custom(format!(
                    "{tag} payload must not execute or surface a server error"
                )));
                cases.push(
                    Scenario::new(
                        format!("{}:{tag}", case_id("injection-probe", &page.path, Some(form_index))),
                        format!("Injection probe ({tag}) on {}", page.path),
                        CoverageType::Security,
                    )
                    .tagged(["security", tag])
                    .with_risk(Risk::High)
                    .with_steps(steps),
                );
            }
        }
    }
    cases
}
