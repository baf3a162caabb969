use serde_json::json;
use std::sync::Arc;

use super::render::{self, Action, PageCases, js_str, one_line};
use super::{FrameworkAdapter, RenderOutput, RenderSettings};
use crate::executor::{ArtifactLayout, CommandRunner, SharedRunner};
use crate::scenario::{RenderedFile, TestPlan};
use crate::synthesis::{AriaRole, Locator};

pub const ID: &str = "appium-js";

/// WebdriverIO 세션 생성과 URL/업로드 헬퍼이다.
const SESSION_HELPER: &str = r#"const path = require("path");
const { remote } = require("webdriverio");

const BASE_URL = process.env.TM_BASE_URL || process.env.BASE_URL || %BASE_URL%;

async function openSession() {
  const capabilities = process.env.TM_APPIUM_CAPS
    ? JSON.parse(process.env.TM_APPIUM_CAPS)
    : { platformName: "Android", browserName: "Chrome", "appium:automationName": "UiAutomator2" };
  return remote({
    hostname: process.env.APPIUM_HOST || "127.0.0.1",
    port: Number(process.env.APPIUM_PORT || 4723),
    logLevel: "warn",
    capabilities,
  });
}

async function open(driver, target) {
  await driver.url(new URL(target, BASE_URL).toString());
}

async function upload(driver, selector, file) {
  const remotePath = await driver.uploadFile(path.resolve(__dirname, "..", "..", file));
  await driver.$(selector).setValue(remotePath);
}

module.exports = { openSession, open, upload };
"#;

/// XPath 문자열 리터럴을 만든다. 두 종류 따옴표가 모두 있으면 concat()을 쓴다.
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Appium(WebdriverIO + Mocha) 어댑터이다.
#[derive(Debug, Clone)]
pub struct AppiumAdapter {
    settings: RenderSettings,
}

impl AppiumAdapter {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    /// 로케이터를 WebdriverIO 셀렉터 문자열로 바꾼다.
    fn selector(&self, locator: &Locator) -> String {
        match locator {
            Locator::Label(label) => format!("~{label}"),
            Locator::Placeholder(text) => format!("//*[@placeholder={}]", xpath_literal(text)),
            Locator::Name(name) => format!("//*[@name={}]", xpath_literal(name)),
            Locator::InputType(ty) => format!("//input[@type={}]", xpath_literal(ty)),
            Locator::FirstField => "(//input | //textarea | //select)[1]".to_string(),
            Locator::Role {
                role: AriaRole::Button,
                name,
            } => format!(
                "//*[self::button or @role='button'][normalize-space()={}]",
                xpath_literal(name)
            ),
            Locator::Role {
                role: AriaRole::Link,
                name,
            } => format!("//a[normalize-space()={}]", xpath_literal(name)),
            Locator::FirstOfRole(role) => format!("(//{})[1]", role.tag()),
            Locator::Text(text) => {
                format!("//*[text()[contains(normalize-space(), {})]]", xpath_literal(text))
            }
            Locator::Css(css) => css.clone(),
        }
    }

    fn action_line(&self, action: &Action) -> String {
        match action {
            Action::Goto(url) => format!("await open(driver, {});", js_str(url)),
            Action::Click(locator) => format!("await {}.click();", self.locator_expression(locator)),
            Action::Fill { locator, value } => format!(
                "await {}.setValue({});",
                self.locator_expression(locator),
                js_str(value)
            ),
            Action::ExpectText(text) => format!(
                "await {}.waitForDisplayed();",
                self.locator_expression(&Locator::Text(text.clone()))
            ),
            Action::ExpectVisible(locator) => {
                format!("await {}.waitForDisplayed();", self.locator_expression(locator))
            }
            Action::Upload { locator, path } => format!(
                "await upload(driver, {}, {});",
                js_str(&self.selector(locator)),
                js_str(path)
            ),
            Action::Custom(note) => format!("// {}", one_line(note)),
        }
    }

    fn spec_file(&self, page: &PageCases<'_>) -> String {
        let mut out = format!(
            "// {}\nconst {{ openSession, open, upload }} = require(\"./support/session\");\n\n",
            render::page_banner(page)
        );
        out.push_str(&format!("describe({}, function () {{\n", js_str(&page.key)));
        out.push_str("  let driver;\n\n");
        out.push_str("  before(async function () {\n    driver = await openSession();\n  });\n\n");
        out.push_str(
            "  after(async function () {\n    if (driver) await driver.deleteSession();\n  });\n",
        );
        for (scenario, actions) in &page.cases {
            out.push_str(&format!(
                "\n  it({}, async function () {{\n",
                js_str(&scenario.title)
            ));
            for action in actions {
                out.push_str("    ");
                out.push_str(&self.action_line(action));
                out.push('\n');
            }
            out.push_str("  });\n");
        }
        out.push_str("});\n");
        out
    }

    fn mocharc(&self) -> String {
        let config = json!({
            "spec": ["test/**/*.spec.js"],
            "timeout": self.settings.test_timeout_ms,
            "reporter": "json",
            "reporter-option": [format!("output={}", self.settings.report_file)],
        });
        format!("{config:#}\n")
    }
}

fn runner_args(_: &ArtifactLayout) -> Vec<String> {
    ["mocha", "--config", ".mocharc.json"]
        .map(String::from)
        .to_vec()
}

impl FrameworkAdapter for AppiumAdapter {
    fn id(&self) -> &'static str {
        ID
    }

    fn display_name(&self) -> &'static str {
        "Appium (WebdriverIO)"
    }

    fn render(&self, plan: &TestPlan) -> RenderOutput {
        let (pages, failures) = render::prepare(plan);
        let package = json!({
            "name": "testforge-appium",
            "private": true,
            "scripts": { "test": "mocha --config .mocharc.json" },
            "devDependencies": {
                "mocha": "^10.4.0",
                "webdriverio": "^8.36.0",
            },
        });
        let helper = SESSION_HELPER.replace("%BASE_URL%", &js_str(plan.base_url()));
        let mut files = vec![
            RenderedFile::new("package.json", format!("{package:#}\n")),
            RenderedFile::new(".mocharc.json", self.mocharc()),
            RenderedFile::new("test/support/session.js", helper),
        ];
        for page in &pages {
            files.push(RenderedFile::new(
                format!("test/{}.spec.js", page.file_stem()),
                self.spec_file(page),
            ));
        }
        render::finish(ID, files, &pages, failures)
    }

    fn runner(&self) -> SharedRunner {
        Arc::new(
            CommandRunner::npx(ID, runner_args).with_install(self.settings.install_dependencies),
        )
    }

    fn locator_expression(&self, locator: &Locator) -> String {
        format!("driver.$({})", js_str(&self.selector(locator)))
    }
}
