use once_cell::sync::Lazy;
use regex::Regex;

use super::state::FailureKind;

/// 분류 결과와 근거가 된 로그 줄이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: FailureKind,
    /// 힐링이 대상 Step을 찾을 때 쓰는 근거.
    pub evidence: Option<String>,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("정규식 컴파일 실패")
}

static PROCESS_START: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)(command not found|could not determine executable to run|cannot find module|spawn \S+ ENOENT|is not recognized as an internal or external command)",
    )
});

static PW_ACTION_TIMEOUT: Lazy<Regex> =
    Lazy::new(|| compile(r"locator\.\w+: Timeout \d+ms exceeded"));

static PW_WAITING_FOR: Lazy<Regex> = Lazy::new(|| compile(r"waiting for (getBy\w+|locator)\("));

static SELECTOR_LINE: Lazy<Regex> = Lazy::new(|| {
    compile(
        r#"(Expected to find element: .+, but never found it|Unable to find an? (accessible )?element with|Unable to find a label with the text of: |Found a label with the text of: .+, however no form control was found|no such element|element \(".+"\) still not (displayed|existing))"#,
    )
});

static TIMEOUT: Lazy<Regex> = Lazy::new(|| {
    compile(r"(Test timeout of \d+ms exceeded|Timeout of \d+ms exceeded|TimeoutError|function timed out)")
});

static NETWORK: Lazy<Regex> = Lazy::new(|| {
    compile(r"(net::ERR_\w+|ECONNREFUSED|ENOTFOUND|ECONNRESET|ETIMEDOUT|getaddrinfo|socket hang up)")
});

static ASSERTION: Lazy<Regex> = Lazy::new(|| {
    compile(r"(AssertionError|expect\(.+\)\.\w+|Expected: |expected .+ to )")
});

fn first_match(lines: &[String], regex: &Regex) -> Option<String> {
    lines.iter().find(|line| regex.is_match(line)).cloned()
}

fn process_start(lines: &[String]) -> Option<String> {
    first_match(lines, &PROCESS_START)
}

/// Playwright 액션 타임아웃은 `waiting for …` 호출 로그가 함께 있을 때만 셀렉터 실패로 본다.
fn selector_not_found(lines: &[String]) -> Option<String> {
    if lines.iter().any(|line| PW_ACTION_TIMEOUT.is_match(line)) {
        if let Some(waiting) = first_match(lines, &PW_WAITING_FOR) {
            return Some(waiting);
        }
    }
    first_match(lines, &SELECTOR_LINE)
}

fn timeout(lines: &[String]) -> Option<String> {
    first_match(lines, &TIMEOUT)
}

fn network(lines: &[String]) -> Option<String> {
    first_match(lines, &NETWORK)
}

fn assertion(lines: &[String]) -> Option<String> {
    first_match(lines, &ASSERTION)
}

type Rule = (FailureKind, fn(&[String]) -> Option<String>);

/// 순서가 곧 우선순위이다.
const RULES: [Rule; 5] = [
    (FailureKind::ProcessStart, process_start),
    (FailureKind::SelectorNotFound, selector_not_found),
    (FailureKind::Timeout, timeout),
    (FailureKind::Network, network),
    (FailureKind::Assertion, assertion),
];

/// 비정상 종료한 실행의 로그를 분류한다. 어느 규칙에도 맞지 않으면 Unknown이다.
pub fn classify(lines: &[String]) -> Classification {
    RULES
        .iter()
        .find_map(|(kind, rule)| {
            rule(lines).map(|evidence| Classification {
                kind: *kind,
                evidence: Some(evidence),
            })
        })
        .unwrap_or(Classification {
            kind: FailureKind::Unknown,
            evidence: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn playwright_action_timeout_with_call_log_is_selector() {
        let output = lines(&[
            "  1) [chromium] › tests/login.spec.ts:3:5 › Submit form",
            "    Error: locator.fill: Timeout 30000ms exceeded.",
            "    Call log:",
            "      - waiting for getByLabel('Email Address')",
        ]);
        let result = classify(&output);
        assert_eq!(result.kind, FailureKind::SelectorNotFound);
        assert!(result.evidence.expect("evidence").contains("Email Address"));
    }

    #[test]
    fn bare_timeout_is_not_selector() {
        let output = lines(&["Test timeout of 30000ms exceeded."]);
        assert_eq!(classify(&output).kind, FailureKind::Timeout);
        let action_only = lines(&["Error: locator.click: Timeout 5000ms exceeded."]);
        assert_eq!(classify(&action_only).kind, FailureKind::Unknown);
    }

    #[test]
    fn cypress_and_webdriver_selector_messages() {
        let cypress = lines(&[
            "AssertionError: Timed out retrying after 4000ms: Expected to find element: [name=\"email\"], but never found it.",
        ]);
        assert_eq!(classify(&cypress).kind, FailureKind::SelectorNotFound);
        let wdio = lines(&["Error: element (\"~Email\") still not displayed after 10000ms"]);
        assert_eq!(classify(&wdio).kind, FailureKind::SelectorNotFound);
    }

    #[test]
    fn testing_library_label_messages_are_selector() {
        let missing = lines(&[
            "  1) Submit login form",
            "Error: Timed out retrying after 4000ms: Unable to find a label with the text of: Email Address",
        ]);
        let result = classify(&missing);
        assert_eq!(result.kind, FailureKind::SelectorNotFound);
        assert!(result.evidence.expect("evidence").ends_with("Email Address"));

        let unbound = lines(&[
            "TestingLibraryElementError: Timed out retrying after 4000ms: Found a label with the text of: Email Address, however no form control was found associated to that label. Make sure you're using the \"for\" attribute or \"aria-labelledby\" attribute correctly.",
        ]);
        assert_eq!(classify(&unbound).kind, FailureKind::SelectorNotFound);
    }

    #[test]
    fn ordering_and_fallback() {
        let start = lines(&["sh: 1: npx: command not found", "no such element"]);
        assert_eq!(classify(&start).kind, FailureKind::ProcessStart);
        let net = lines(&["page.goto: net::ERR_CONNECTION_REFUSED at http://localhost:4173/"]);
        assert_eq!(classify(&net).kind, FailureKind::Network);
        let assertion = lines(&["Error: expect(received).toBe(expected)"]);
        assert_eq!(classify(&assertion).kind, FailureKind::Assertion);
        let unknown = classify(&lines(&["something odd happened"]));
        assert_eq!(unknown.kind, FailureKind::Unknown);
        assert!(!unknown.kind.is_healable());
    }
}
