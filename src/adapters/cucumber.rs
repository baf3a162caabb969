use serde_json::json;
use std::sync::Arc;

use super::render::{self, Action, PageCases, js_str, one_line};
use super::{FrameworkAdapter, RenderOutput, RenderSettings};
use crate::executor::{ArtifactLayout, CommandRunner, SharedRunner};
use crate::scenario::{RenderedFile, TestPlan};
use crate::synthesis::Locator;

pub const ID: &str = "cucumber-js";

/// 힌트 문자열을 Playwright 로케이터로 해석하는 공용 Step 정의이다.
const STEP_DEFINITIONS: &str = r#"const { Given, When, Then, Before, After, setDefaultTimeout } = require("@cucumber/cucumber");
const { chromium, expect } = require("@playwright/test");

setDefaultTimeout(%TIMEOUT%);

const BASE_URL = process.env.TM_BASE_URL || process.env.BASE_URL || %BASE_URL%;

function locate(page, hint) {
  if (hint === "field") return page.locator("input, textarea, select").first();
  if (hint === "button") return page.locator("button").first();
  if (hint === "link") return page.locator("a").first();
  const eq = hint.indexOf("=");
  const prefix = eq > 0 ? hint.slice(0, eq) : "";
  const value = eq > 0 ? hint.slice(eq + 1) : "";
  switch (prefix) {
    case "label":
      return page.getByLabel(value);
    case "placeholder":
      return page.getByPlaceholder(value);
    case "name":
      return page.locator(`[name=${JSON.stringify(value)}]`);
    case "type":
      return page.locator(`input[type=${JSON.stringify(value)}]`);
    case "button":
    case "link":
      return page.getByRole(prefix, { name: value });
    case "text":
      return page.getByText(value);
    case "css":
      return page.locator(value);
    default:
      return page.locator(hint);
  }
}

Before(async function () {
  this.browser = await chromium.launch();
  this.page = await this.browser.newPage({ baseURL: BASE_URL });
});

After(async function () {
  if (this.browser) await this.browser.close();
});

Given("I open {string}", async function (url) {
  await this.page.goto(url);
});

When("I click {string}", async function (hint) {
  await locate(this.page, hint).click();
});

When("I fill {string} with {string}", async function (hint, value) {
  await locate(this.page, hint).fill(value);
});

When("I upload {string} to {string}", async function (file, hint) {
  await locate(this.page, hint).setInputFiles(file);
});

Then("I should see text {string}", async function (text) {
  await expect(this.page.getByText(text).first()).toBeVisible();
});

Then("{string} should be visible", async function (hint) {
  await expect(locate(this.page, hint)).toBeVisible();
});
"#;

/// Gherkin 키워드 분류이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Given,
    When,
    Then,
}

impl Keyword {
    fn as_str(&self) -> &'static str {
        match self {
            Keyword::Given => "Given",
            Keyword::When => "When",
            Keyword::Then => "Then",
        }
    }
}

/// Gherkin 문자열 인자를 만든다.
fn gherkin_str(value: &str) -> String {
    let escaped = one_line(value).replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// cucumber-js + Playwright 어댑터이다. 페이지마다 feature 파일 하나를 만든다.
#[derive(Debug, Clone)]
pub struct CucumberAdapter {
    settings: RenderSettings,
}

impl CucumberAdapter {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    fn step_line(&self, action: &Action, first: bool) -> Option<(Keyword, String)> {
        let line = match action {
            Action::Goto(url) => (
                if first { Keyword::Given } else { Keyword::When },
                format!("I open {}", gherkin_str(url)),
            ),
            Action::Click(locator) => (
                Keyword::When,
                format!("I click {}", gherkin_str(&self.locator_expression(locator))),
            ),
            Action::Fill { locator, value } => (
                Keyword::When,
                format!(
                    "I fill {} with {}",
                    gherkin_str(&self.locator_expression(locator)),
                    gherkin_str(value)
                ),
            ),
            Action::Upload { locator, path } => (
                Keyword::When,
                format!(
                    "I upload {} to {}",
                    gherkin_str(path),
                    gherkin_str(&self.locator_expression(locator))
                ),
            ),
            Action::ExpectText(text) => {
                (Keyword::Then, format!("I should see text {}", gherkin_str(text)))
            }
            Action::ExpectVisible(locator) => (
                Keyword::Then,
                format!("{} should be visible", gherkin_str(&self.locator_expression(locator))),
            ),
            Action::Custom(_) => return None,
        };
        Some(line)
    }

    fn feature_file(&self, page: &PageCases<'_>) -> String {
        let mut out = format!(
            "# {}\nFeature: {}\n",
            render::page_banner(page),
            one_line(&page.key)
        );
        for (scenario, actions) in &page.cases {
            out.push('\n');
            let tags: Vec<String> = scenario
                .tags
                .iter()
                .map(|t| format!("@{}", t.replace(char::is_whitespace, "-")))
                .collect();
            if !tags.is_empty() {
                out.push_str(&format!("  {}\n", tags.join(" ")));
            }
            out.push_str(&format!("  Scenario: {}\n", one_line(&scenario.title)));
            let mut previous: Option<Keyword> = None;
            for action in actions {
                if let Action::Custom(note) = action {
                    out.push_str(&format!("    # {}\n", one_line(note)));
                    continue;
                }
                let Some((keyword, text)) = self.step_line(action, previous.is_none()) else {
                    continue;
                };
                let word = if previous == Some(keyword) {
                    "And"
                } else {
                    keyword.as_str()
                };
                out.push_str(&format!("    {word} {text}\n"));
                previous = Some(keyword);
            }
        }
        out
    }

    fn config_file(&self) -> String {
        format!(
            r#"module.exports = {{
  default: {{
    paths: ["features/**/*.feature"],
    require: ["support/**/*.js"],
    format: ["progress", {report}],
  }},
}};
"#,
            report = js_str(&format!("json:{}", self.settings.report_file)),
        )
    }
}

fn runner_args(_: &ArtifactLayout) -> Vec<String> {
    ["cucumber-js", "--config", "cucumber.js"]
        .map(String::from)
        .to_vec()
}

impl FrameworkAdapter for CucumberAdapter {
    fn id(&self) -> &'static str {
        ID
    }

    fn display_name(&self) -> &'static str {
        "Cucumber (JS)"
    }

    fn render(&self, plan: &TestPlan) -> RenderOutput {
        let (pages, failures) = render::prepare(plan);
        let package = json!({
            "name": "testforge-cucumber",
            "private": true,
            "scripts": { "test": "cucumber-js --config cucumber.js" },
            "devDependencies": {
                "@cucumber/cucumber": "^10.3.1",
                "@playwright/test": "^1.47.2",
            },
        });
        let steps = STEP_DEFINITIONS
            .replace("%TIMEOUT%", &self.settings.test_timeout_ms.to_string())
            .replace("%BASE_URL%", &js_str(plan.base_url()));
        let mut files = vec![
            RenderedFile::new("package.json", format!("{package:#}\n")),
            RenderedFile::new("cucumber.js", self.config_file()),
            RenderedFile::new("support/steps.js", steps),
        ];
        for page in &pages {
            files.push(RenderedFile::new(
                format!("features/{}.feature", page.file_stem()),
                self.feature_file(page),
            ));
        }
        render::finish(ID, files, &pages, failures)
    }

    fn runner(&self) -> SharedRunner {
        Arc::new(
            CommandRunner::npx(ID, runner_args).with_install(self.settings.install_dependencies),
        )
    }

    /// Gherkin에는 정규 힌트 문자열을 그대로 쓰고 `support/steps.js`가 해석한다.
    fn locator_expression(&self, locator: &Locator) -> String {
        locator.to_string()
    }
}
