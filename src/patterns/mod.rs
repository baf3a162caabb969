//! 페르소나별 시나리오 생성 패턴 모음이다.

pub mod functional;
pub mod security;

use indexmap::IndexMap;

use crate::discovery::{Discovery, EnvDescriptor};
use crate::error::ConfigError;
use crate::scenario::Scenario;

/// 패턴에 전달되는 읽기 전용 입력이다.
#[derive(Debug, Clone, Copy)]
pub struct PatternInput<'a> {
    /// 크롤링 결과.
    pub discovery: &'a Discovery,
    /// 치환이 끝난 환경 기술자.
    pub env: &'a EnvDescriptor,
}

/// 이름 붙은 순수 시나리오 생성 함수이다. 같은 입력이면 같은 출력을 낸다.
#[derive(Clone, Copy)]
pub struct Pattern {
    pub name: &'static str,
    pub generate: fn(&PatternInput<'_>) -> Vec<Scenario>,
}

impl Pattern {
    /// 패턴을 실행한다.
    pub fn run(&self, input: &PatternInput<'_>) -> Vec<Scenario> {
        (self.generate)(input)
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern").field("name", &self.name).finish()
    }
}

pub const PAGE_SMOKE: Pattern = Pattern {
    name: "page-smoke",
    generate: functional::page_smoke,
};
pub const FORM_HAPPY_PATH: Pattern = Pattern {
    name: "form-happy-path",
    generate: functional::form_happy_path,
};
pub const REQUIRED_VALIDATION: Pattern = Pattern {
    name: "required-validation",
    generate: functional::required_validation,
};
pub const FILE_UPLOAD: Pattern = Pattern {
    name: "file-upload",
    generate: functional::file_upload,
};
pub const LINK_NAVIGATION: Pattern = Pattern {
    name: "link-navigation",
    generate: functional::link_navigation,
};
pub const LABELLED_FIELDS: Pattern = Pattern {
    name: "labelled-fields",
    generate: functional::labelled_fields,
};
pub const INJECTION_PROBE: Pattern = Pattern {
    name: "injection-probe",
    generate: security::injection_probe,
};

/// 페르소나 ID → 순서 있는 패턴 묶음이다.
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    bundles: IndexMap<String, Vec<Pattern>>,
}

impl PatternLibrary {
    /// 빈 라이브러리를 만든다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 페르소나 네 가지를 등록한 라이브러리를 만든다.
    pub fn builtin() -> Self {
        let mut library = Self::new();
        library.register(
            "sdet",
            vec![
                PAGE_SMOKE,
                FORM_HAPPY_PATH,
                REQUIRED_VALIDATION,
                FILE_UPLOAD,
                LINK_NAVIGATION,
            ],
        );
        library.register("manual", vec![PAGE_SMOKE, LABELLED_FIELDS, LINK_NAVIGATION]);
        library.register(
            "automation",
            vec![PAGE_SMOKE, FORM_HAPPY_PATH, FILE_UPLOAD, LINK_NAVIGATION],
        );
        library.register("security", vec![PAGE_SMOKE, INJECTION_PROBE]);
        library
    }

    /// 페르소나 묶음을 등록한다. 같은 ID는 교체된다.
    pub fn register(&mut self, persona: impl Into<String>, patterns: Vec<Pattern>) {
        self.bundles.insert(persona.into(), patterns);
    }

    /// 페르소나 묶음을 조회한다.
    pub fn bundle(&self, persona: &str) -> Result<&[Pattern], ConfigError> {
        self.bundles
            .get(persona)
            .map(Vec::as_slice)
            .ok_or_else(|| ConfigError::UnknownPersona(persona.to_string()))
    }

    /// 등록 순서대로 페르소나 ID를 반환한다.
    pub fn personas(&self) -> impl Iterator<Item = &str> {
        self.bundles.keys().map(String::as_str)
    }
}

/// 패턴 이름과 페이지 경로로 안정적인 시나리오 ID를 만든다.
pub(crate) fn case_id(pattern: &str, path: &str, index: Option<usize>) -> String {
    match index {
        Some(index) => format!("{pattern}:{path}#{index}"),
        None => format!("{pattern}:{path}"),
    }
}
