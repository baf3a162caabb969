//! Discovery 힌트만으로 로케이터와 입력 값을 합성한다.
//!
//! 모든 어댑터와 힐링 단계가 같은 규칙 테이블을 공유한다. 규칙 순서가 곧 우선순위이다.

use std::fmt;
use std::str::FromStr;

use crate::discovery::FieldDescriptor;

/// 역할 기반 로케이터가 지원하는 ARIA 역할이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AriaRole {
    Button,
    Link,
}

impl AriaRole {
    /// 힌트 문법과 동일한 이름이다.
    pub fn as_str(&self) -> &'static str {
        match self {
            AriaRole::Button => "button",
            AriaRole::Link => "link",
        }
    }

    /// 역할에 대응하는 HTML 태그이다.
    pub fn tag(&self) -> &'static str {
        match self {
            AriaRole::Button => "button",
            AriaRole::Link => "a",
        }
    }
}

/// 프레임워크 중립 로케이터이다. `Display`가 정규 힌트 문자열을 만든다.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Label(String),
    Placeholder(String),
    Name(String),
    InputType(String),
    /// 첫 번째 input/textarea/select.
    FirstField,
    Role { role: AriaRole, name: String },
    FirstOfRole(AriaRole),
    Text(String),
    Css(String),
}

/// 로케이터 변형의 종류이다. 힐링 시 실패한 규칙을 가리킬 때 쓴다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocatorKind {
    Label,
    Placeholder,
    Name,
    InputType,
    FirstField,
    Role,
    FirstOfRole,
    Text,
    Css,
}

impl Locator {
    /// 로케이터 종류를 반환한다.
    pub fn kind(&self) -> LocatorKind {
        match self {
            Locator::Label(_) => LocatorKind::Label,
            Locator::Placeholder(_) => LocatorKind::Placeholder,
            Locator::Name(_) => LocatorKind::Name,
            Locator::InputType(_) => LocatorKind::InputType,
            Locator::FirstField => LocatorKind::FirstField,
            Locator::Role { .. } => LocatorKind::Role,
            Locator::FirstOfRole(_) => LocatorKind::FirstOfRole,
            Locator::Text(_) => LocatorKind::Text,
            Locator::Css(_) => LocatorKind::Css,
        }
    }

    /// 로케이터가 담고 있는 사용자 가시 값이다. 실패 로그와 대조할 때 쓴다.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Locator::Label(v)
            | Locator::Placeholder(v)
            | Locator::Name(v)
            | Locator::InputType(v)
            | Locator::Text(v)
            | Locator::Css(v) => Some(v),
            Locator::Role { name, .. } => Some(name),
            Locator::FirstField | Locator::FirstOfRole(_) => None,
        }
    }

    /// 힌트 문자열을 해석한다. 접두사가 없으면 원시 CSS 셀렉터로 본다.
    pub fn parse(hint: &str) -> Result<Locator, String> {
        let hint = hint.trim();
        if hint.is_empty() {
            return Err("대상 힌트가 비어 있습니다".into());
        }
        match hint {
            "field" => return Ok(Locator::FirstField),
            "button" => return Ok(Locator::FirstOfRole(AriaRole::Button)),
            "link" => return Ok(Locator::FirstOfRole(AriaRole::Link)),
            _ => {}
        }
        let Some((prefix, value)) = hint.split_once('=') else {
            return Ok(Locator::Css(hint.to_string()));
        };
        let build: fn(String) -> Locator = match prefix.trim() {
            "label" => Locator::Label,
            "placeholder" => Locator::Placeholder,
            "name" => Locator::Name,
            "type" => Locator::InputType,
            "text" => Locator::Text,
            "css" => Locator::Css,
            "button" => |name| Locator::Role {
                role: AriaRole::Button,
                name,
            },
            "link" => |name| Locator::Role {
                role: AriaRole::Link,
                name,
            },
            _ => return Ok(Locator::Css(hint.to_string())),
        };
        let value = value.trim();
        if value.is_empty() {
            return Err(format!("`{}=` 힌트 값이 비어 있습니다", prefix.trim()));
        }
        Ok(build(value.to_string()))
    }
}

impl FromStr for Locator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locator::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Label(v) => write!(f, "label={v}"),
            Locator::Placeholder(v) => write!(f, "placeholder={v}"),
            Locator::Name(v) => write!(f, "name={v}"),
            Locator::InputType(v) => write!(f, "type={v}"),
            Locator::FirstField => f.write_str("field"),
            Locator::Role { role, name } => write!(f, "{}={name}", role.as_str()),
            Locator::FirstOfRole(role) => f.write_str(role.as_str()),
            Locator::Text(v) => write!(f, "text={v}"),
            Locator::Css(v) => write!(f, "css={v}"),
        }
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn by_label(field: &FieldDescriptor) -> Option<Locator> {
    present(&field.label).map(Locator::Label)
}

fn by_placeholder(field: &FieldDescriptor) -> Option<Locator> {
    present(&field.placeholder).map(Locator::Placeholder)
}

fn by_name(field: &FieldDescriptor) -> Option<Locator> {
    present(&field.name).map(Locator::Name)
}

fn by_type(field: &FieldDescriptor) -> Option<Locator> {
    present(&field.field_type).map(Locator::InputType)
}

fn first_field(_: &FieldDescriptor) -> Option<Locator> {
    Some(Locator::FirstField)
}

type FieldRule = (LocatorKind, fn(&FieldDescriptor) -> Option<Locator>);

/// 필드 로케이터 우선순위: label → placeholder → name → type → 첫 필드.
const FIELD_RULES: [FieldRule; 5] = [
    (LocatorKind::Label, by_label),
    (LocatorKind::Placeholder, by_placeholder),
    (LocatorKind::Name, by_name),
    (LocatorKind::InputType, by_type),
    (LocatorKind::FirstField, first_field),
];

/// 필드 설명에 첫 번째로 적용되는 로케이터를 반환한다.
pub fn field_locator(field: &FieldDescriptor) -> Locator {
    FIELD_RULES
        .iter()
        .find_map(|(_, rule)| rule(field))
        .unwrap_or(Locator::FirstField)
}

/// `failed` 규칙 다음으로 적용 가능한 로케이터를 반환한다. 더 없으면 `None`이다.
pub fn field_locator_after(field: &FieldDescriptor, failed: LocatorKind) -> Option<Locator> {
    let position = FIELD_RULES.iter().position(|(kind, _)| *kind == failed)?;
    FIELD_RULES[position + 1..]
        .iter()
        .find_map(|(_, rule)| rule(field))
}

/// 필드 설명의 규칙 중 하나가 `locator`를 만들어 내는지 확인한다.
pub fn field_produces(field: &FieldDescriptor, locator: &Locator) -> bool {
    FIELD_RULES
        .iter()
        .any(|(kind, rule)| *kind == locator.kind() && rule(field).as_ref() == Some(locator))
}

/// 이름이 있으면 역할+이름, 없으면 첫 번째 버튼이다.
pub fn button_locator(name: Option<&str>) -> Locator {
    role_locator(AriaRole::Button, name)
}

/// 이름이 있으면 역할+이름, 없으면 첫 번째 링크이다.
pub fn link_locator(text: Option<&str>) -> Locator {
    role_locator(AriaRole::Link, text)
}

fn role_locator(role: AriaRole, name: Option<&str>) -> Locator {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => Locator::Role {
            role,
            name: name.to_string(),
        },
        None => Locator::FirstOfRole(role),
    }
}

/// 값 규칙이 참조하는 정규화된 필드 정보이다.
struct ValueKey {
    text: String,
    field_type: String,
}

impl ValueKey {
    fn of(field: &FieldDescriptor) -> Self {
        let text = [&field.name, &field.placeholder, &field.label]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let field_type = field
            .field_type
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        Self { text, field_type }
    }
}

fn is_email(key: &ValueKey) -> bool {
    key.field_type == "email" || key.text.contains("email")
}

fn is_phone(key: &ValueKey) -> bool {
    key.field_type == "tel" || key.text.contains("phone")
}

fn is_zip(key: &ValueKey) -> bool {
    key.text.contains("zip") || key.text.contains("postal")
}

fn is_name(key: &ValueKey) -> bool {
    key.text.contains("name")
}

fn is_password(key: &ValueKey) -> bool {
    key.field_type == "password" || key.text.contains("pass")
}

fn is_number(key: &ValueKey) -> bool {
    key.field_type == "number"
}

type ValueRule = (fn(&ValueKey) -> bool, &'static str);

const VALUE_RULES: [ValueRule; 6] = [
    (is_email, "qa+auto@example.com"),
    (is_phone, "4045551234"),
    (is_zip, "30301"),
    (is_name, "QA Auto"),
    (is_password, "P@ssw0rd!"),
    (is_number, "42"),
];

/// 어떤 규칙에도 걸리지 않을 때의 값이다.
pub const FALLBACK_VALUE: &str = "Test value";

/// 필드에 넣을 그럴듯한 값을 고른다. 모든 입력에 대해 값을 반환한다.
pub fn fill_value(field: &FieldDescriptor) -> &'static str {
    let key = ValueKey::of(field);
    VALUE_RULES
        .iter()
        .find(|(matches, _)| matches(&key))
        .map(|(_, value)| *value)
        .unwrap_or(FALLBACK_VALUE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(label: Option<&str>, placeholder: Option<&str>, name: Option<&str>) -> FieldDescriptor {
        FieldDescriptor {
            label: label.map(String::from),
            placeholder: placeholder.map(String::from),
            name: name.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn label_beats_placeholder() {
        let desc = field(Some("Email"), Some("you@x.com"), Some("email"));
        assert_eq!(field_locator(&desc), Locator::Label("Email".into()));
        assert_eq!(field_locator(&desc).to_string(), "label=Email");
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let desc = field(Some(""), Some("  "), None);
        assert_eq!(field_locator(&desc), Locator::FirstField);
        let typed = FieldDescriptor {
            field_type: Some("email".into()),
            ..Default::default()
        };
        assert_eq!(field_locator(&typed), Locator::InputType("email".into()));
    }

    #[test]
    fn next_rule_after_failed_kind() {
        let desc = field(Some("Email"), None, Some("email"));
        assert_eq!(
            field_locator_after(&desc, LocatorKind::Label),
            Some(Locator::Name("email".into()))
        );
        assert_eq!(
            field_locator_after(&desc, LocatorKind::Name),
            Some(Locator::FirstField)
        );
        assert_eq!(field_locator_after(&desc, LocatorKind::FirstField), None);
        assert_eq!(field_locator_after(&desc, LocatorKind::Role), None);
    }

    #[test]
    fn hint_grammar_parses_and_prints_canonically() {
        for hint in [
            "label=Email Address",
            "placeholder=Search",
            "name=q",
            "type=password",
            "field",
            "button=Log in",
            "button",
            "link=Pricing",
            "link",
            "text=Welcome",
            "css=#main > form",
        ] {
            let parsed = Locator::parse(hint).expect(hint);
            assert_eq!(parsed.to_string(), hint);
        }
        assert_eq!(
            Locator::parse("input[name=email]"),
            Ok(Locator::Css("input[name=email]".into()))
        );
        assert!(Locator::parse("label=").is_err());
        assert!(Locator::parse("   ").is_err());
    }

    #[test]
    fn role_locators_fall_back_to_first_element() {
        assert_eq!(
            button_locator(Some("Submit")),
            Locator::Role {
                role: AriaRole::Button,
                name: "Submit".into()
            }
        );
        assert_eq!(button_locator(Some(" ")), Locator::FirstOfRole(AriaRole::Button));
        assert_eq!(link_locator(None), Locator::FirstOfRole(AriaRole::Link));
    }

    #[test]
    fn value_synthesis_is_total() {
        let cases = [
            (field(Some("Email Address"), None, None), "qa+auto@example.com"),
            (field(None, None, Some("mobile_phone")), "4045551234"),
            (field(Some("ZIP code"), None, None), "30301"),
            (field(Some("Full name"), None, None), "QA Auto"),
            (field(None, None, Some("pass1")), "P@ssw0rd!"),
            (field(Some("Comment"), None, None), FALLBACK_VALUE),
            (FieldDescriptor::default(), FALLBACK_VALUE),
        ];
        for (desc, expected) in cases {
            assert_eq!(fill_value(&desc), expected, "{desc:?}");
        }
        let tel = FieldDescriptor {
            field_type: Some("tel".into()),
            ..Default::default()
        };
        assert_eq!(fill_value(&tel), "4045551234");
        let number = FieldDescriptor {
            field_type: Some("number".into()),
            ..Default::default()
        };
        assert_eq!(fill_value(&number), "42");
    }
}
