use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::engine::ExecutionContext;
use crate::error::ConfigError;
use crate::scenario::url_path;

/// 크롤러가 수집한 대상 애플리케이션 정보이다. 컴파일러는 읽기만 한다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    /// 크롤링 시작 URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// 발견된 페이지 목록.
    #[serde(default)]
    pub pages: Vec<DiscoveredPage>,
}

impl Discovery {
    /// 경로가 일치하는 페이지를 찾는다. 절대 URL도 경로로 비교한다.
    pub fn page(&self, path_or_url: &str) -> Option<&DiscoveredPage> {
        let wanted = url_path(path_or_url);
        self.pages.iter().find(|page| url_path(&page.path) == wanted)
    }

    /// 모든 페이지의 폼 필드를 발견 순서대로 순회한다.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.pages
            .iter()
            .flat_map(|page| page.forms.iter())
            .flat_map(|form| form.fields.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPage {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub headings: Vec<String>,
    #[serde(default)]
    pub text: Vec<String>,
    #[serde(default)]
    pub forms: Vec<DiscoveredForm>,
    #[serde(default)]
    pub links: Vec<DiscoveredLink>,
    #[serde(default)]
    pub buttons: Vec<String>,
}

impl DiscoveredPage {
    /// 페이지 제목, 없으면 첫 제목 요소를 반환한다.
    pub fn landmark(&self) -> Option<&str> {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| {
                self.headings
                    .iter()
                    .map(String::as_str)
                    .find(|h| !h.trim().is_empty())
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// 제출 버튼 텍스트.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit: Option<String>,
}

/// 입력 필드 힌트이다. 모든 항목이 선택 사항이다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl FieldDescriptor {
    /// 파일 입력인지 확인한다.
    pub fn is_file(&self) -> bool {
        self.field_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("file"))
    }

    /// 자유 텍스트를 받는 필드인지 확인한다.
    pub fn is_textual(&self) -> bool {
        match self.field_type.as_deref().map(str::to_ascii_lowercase) {
            None => true,
            Some(t) => matches!(
                t.as_str(),
                "" | "text" | "search" | "email" | "textarea" | "url"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredLink {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// 테스트 대상 인증 정보이다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCredentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// 실행 환경 기술자이다. 값에 `${VAR}` 플레이스홀더를 쓸 수 있다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthCredentials>,
    /// 러너에 그대로 전달되는 사용자 변수.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

impl EnvDescriptor {
    /// 모든 플레이스홀더를 치환한 사본을 만든다.
    ///
    /// 치환되지 않은 값이나 빈 인증 사용자명은 `ConfigError::MissingEnv`이다.
    pub fn resolve(&self) -> Result<EnvDescriptor, ConfigError> {
        let mut ctx = ExecutionContext::new();
        for (key, value) in &self.vars {
            ctx.set_var(key.clone(), value.clone());
        }

        let mut vars = BTreeMap::new();
        for (key, value) in &self.vars {
            vars.insert(key.clone(), ctx.expand_required(value, &format!("vars.{key}"))?);
        }

        let base_url = self
            .base_url
            .as_deref()
            .map(|url| ctx.expand_required(url, "baseUrl"))
            .transpose()?
            .filter(|url| !url.trim().is_empty());

        let auth = match &self.auth {
            None => None,
            Some(auth) => {
                let username = ctx.expand_required(&auth.username, "auth.username")?;
                if username.trim().is_empty() {
                    return Err(ConfigError::MissingEnv {
                        field: "auth.username".into(),
                        reason: "비어 있습니다".into(),
                    });
                }
                let password = ctx.expand_required(&auth.password, "auth.password")?;
                Some(AuthCredentials { username, password })
            }
        };

        Ok(EnvDescriptor {
            base_url,
            auth,
            vars,
        })
    }
}

/// YAML 또는 JSON 파일에서 Discovery를 읽는다.
pub fn load_discovery_from_file(path: &Path) -> Result<Discovery, ConfigError> {
    load_from_file(path)
}

/// Reader에서 Discovery를 읽는다.
pub fn load_discovery_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<Discovery> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    Ok(serde_yaml::from_str(&buf)?)
}

/// YAML 또는 JSON 파일에서 환경 기술자를 읽는다.
pub fn load_env_from_file(path: &Path) -> Result<EnvDescriptor, ConfigError> {
    load_from_file(path)
}

fn load_from_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let load_error = |reason: String| ConfigError::Load {
        path: path.to_path_buf(),
        reason,
    };
    let mut buf = String::new();
    File::open(path)
        .and_then(|mut file| file.read_to_string(&mut buf))
        .map_err(|e| load_error(e.to_string()))?;
    serde_yaml::from_str(&buf).map_err(|e| load_error(e.to_string()))
}
