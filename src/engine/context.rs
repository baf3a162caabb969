use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

use crate::error::ConfigError;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("정규식 컴파일 실패"));

/// 러너 프로세스에 넘길 환경 변수와 `${VAR}` 치환 규칙을 담는 컨텍스트이다.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// 문자열 기반 변수 저장소이다.
    vars: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// 비어 있는 실행 컨텍스트를 생성한다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 컨텍스트 변수 값을 설정한다.
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// 변수 값을 조회한다.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// 컨텍스트 또는 프로세스 환경 변수에서 값을 조회한다.
    pub fn get_or_env(&self, key: &str) -> Option<String> {
        if let Some(value) = self.get_var(key) {
            return Some(value.to_string());
        }
        std::env::var(key).ok()
    }

    /// `${VAR}` 패턴을 실제 값으로 치환한다.
    ///
    /// # 반환값
    /// 치환되지 않은 플레이스홀더가 남으면 그 변수명을 `Err`로 돌려준다.
    pub fn expand_placeholders(&self, template: &str) -> Result<String, String> {
        let mut missing = None;
        let result = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match self.get_or_env(key) {
                Some(value) => value,
                None => {
                    missing.get_or_insert_with(|| key.to_string());
                    format!("${{{key}}}")
                }
            }
        });
        match missing {
            Some(key) => Err(key),
            None => Ok(result.into_owned()),
        }
    }

    /// `template`을 치환하되 값이 없으면 필드 이름을 담은 구성 오류를 반환한다.
    pub fn expand_required(&self, template: &str, field: &str) -> Result<String, ConfigError> {
        self.expand_placeholders(template)
            .map_err(|key| ConfigError::MissingEnv {
                field: field.to_string(),
                reason: format!("${{{key}}} 값을 찾을 수 없습니다"),
            })
    }

    /// 러너에 넘길 환경 맵으로 변환한다.
    pub fn to_env(&self) -> HashMap<String, String> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 컨텍스트 변수가 우선 치환되는지 확인한다.
    #[test]
    fn expands_context_vars() {
        let mut ctx = ExecutionContext::new();
        ctx.set_var("TF_TEST_HOST", "app.example.com");
        let expanded = ctx
            .expand_placeholders("https://${TF_TEST_HOST}/login")
            .expect("expand");
        assert_eq!(expanded, "https://app.example.com/login");
    }

    /// 치환할 수 없는 플레이스홀더는 MissingEnv 오류가 된다.
    #[test]
    fn unresolved_placeholder_is_missing_env() {
        let ctx = ExecutionContext::new();
        let err = ctx
            .expand_required("${TF_SURELY_UNSET_VARIABLE_123}", "auth.username")
            .expect_err("must fail");
        match err {
            ConfigError::MissingEnv { field, reason } => {
                assert_eq!(field, "auth.username");
                assert!(reason.contains("TF_SURELY_UNSET_VARIABLE_123"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
