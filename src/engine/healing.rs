use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::discovery::Discovery;
use crate::error::HealError;
use crate::scenario::{StepKind, TestPlan};
use crate::synthesis::{Locator, field_locator_after, field_produces};

/// 힐링으로 바뀐 Step 하나이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealedStep {
    pub scenario_id: String,
    pub step_index: usize,
    pub from: String,
    pub to: String,
}

impl fmt::Display for HealedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}: {} -> {}",
            self.scenario_id, self.step_index, self.from, self.to
        )
    }
}

/// 힐링 결과이다. `plan`은 원본의 다음 버전이다.
#[derive(Debug, Clone)]
pub struct HealOutcome {
    pub plan: TestPlan,
    pub changes: Vec<HealedStep>,
}

/// 따옴표로 감싼 인자. `getByLabel('…')`, `("~…")` 형태이다.
static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"'([^']*)'|"([^"]*)""#).expect("정규식 컴파일 실패"));

/// 셀렉터 안의 속성 값. `[name="…"]`, `[@type='…']`, `normalize-space()='…'` 형태이다.
static ATTR_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"=\s*(?:'([^']*)'|"([^"]*)")"#).expect("정규식 컴파일 실패"));

/// Testing Library의 따옴표 없는 메시지. `… with the text of: Email Address`.
static TEXT_OF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"text of: (.+?)(?:, however|$)").expect("정규식 컴파일 실패")
});

/// 근거 줄에서 로케이터 인자 후보를 모은다. 비교는 전체 값 일치로만 한다.
fn evidence_arguments(evidence: &str) -> Vec<String> {
    let mut arguments: Vec<String> = Vec::new();
    let quoted = QUOTED
        .captures_iter(evidence)
        .chain(ATTR_VALUE.captures_iter(evidence))
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)));
    let text_of = TEXT_OF.captures_iter(evidence).filter_map(|caps| caps.get(1));
    for found in quoted.chain(text_of) {
        let value = found.as_str().trim().trim_start_matches('~').to_string();
        if !value.is_empty() && !arguments.contains(&value) {
            arguments.push(value);
        }
    }
    arguments
}

/// 실패한 로케이터의 다음 후보를 Discovery 사실에서 고른다.
fn alternative(locator: &Locator, discovery: &Discovery) -> Option<Locator> {
    match locator {
        Locator::Label(_) | Locator::Placeholder(_) | Locator::Name(_) | Locator::InputType(_) => {
            discovery
                .fields()
                .find(|field| field_produces(field, locator))
                .and_then(|field| field_locator_after(field, locator.kind()))
        }
        Locator::Role { role, .. } => Some(Locator::FirstOfRole(*role)),
        _ => None,
    }
}

/// 실패 근거에 등장하는 Step의 로케이터를 다시 합성해 새 플랜 버전을 만든다.
///
/// Step 힌트의 값이 근거의 인자 하나와 정확히 같아야 대상이 된다. 서로 다른 힌트가 둘 이상
/// 맞으면 어느 쪽인지 알 수 없으므로 `Ambiguous`로 거부한다.
/// 근거와 맞는 Step이 없으면 `NoEvidence`, 맞는 Step은 있지만 대체 로케이터가 없으면
/// `NoAlternative`이다.
pub fn heal(plan: &TestPlan, discovery: &Discovery, evidence: &str) -> Result<HealOutcome, HealError> {
    let arguments = evidence_arguments(evidence);
    let mut cases = plan.cases().to_vec();
    let mut implicated: Vec<String> = Vec::new();
    let mut changes = Vec::new();

    for case in cases.iter_mut() {
        for (step_index, step) in case.steps.iter_mut().enumerate() {
            if step.kind == StepKind::Goto {
                continue;
            }
            let Some(hint) = step.target.clone() else {
                continue;
            };
            let Ok(locator) = Locator::parse(&hint) else {
                continue;
            };
            if !locator
                .payload()
                .is_some_and(|payload| arguments.iter().any(|arg| arg == payload.trim()))
            {
                continue;
            }
            if !implicated.contains(&hint) {
                implicated.push(hint.clone());
            }
            if implicated.len() > 1 {
                return Err(HealError::Ambiguous(implicated.join(", ")));
            }
            if let Some(replacement) = alternative(&locator, discovery) {
                let to = replacement.to_string();
                *step = step.retargeted(to.clone());
                changes.push(HealedStep {
                    scenario_id: case.id.clone(),
                    step_index,
                    from: hint,
                    to,
                });
            }
        }
    }

    if implicated.is_empty() {
        return Err(HealError::NoEvidence);
    }
    if changes.is_empty() {
        return Err(HealError::NoAlternative(implicated.join(", ")));
    }
    Ok(HealOutcome {
        plan: plan.revise(cases),
        changes,
    })
}
