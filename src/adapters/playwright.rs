use serde_json::json;
use std::sync::Arc;

use super::render::{self, Action, PageCases, js_str, one_line};
use super::{FrameworkAdapter, RenderOutput, RenderSettings};
use crate::executor::{ArtifactLayout, CommandRunner, SharedRunner};
use crate::scenario::{RenderedFile, TestPlan};
use crate::synthesis::Locator;

pub const ID: &str = "playwright-ts";

/// Playwright Test(TypeScript) 어댑터이다. 페이지마다 `tests/<slug>.spec.ts` 하나를 만든다.
#[derive(Debug, Clone)]
pub struct PlaywrightAdapter {
    settings: RenderSettings,
}

impl PlaywrightAdapter {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    fn config_file(&self, plan: &TestPlan) -> String {
        format!(
            r#"import {{ defineConfig }} from '@playwright/test';

export default defineConfig({{
  testDir: './tests',
  timeout: {timeout},
  retries: 0,
  reporter: [['list'], ['json', {{ outputFile: {report} }}]],
  use: {{
    baseURL: process.env.TM_BASE_URL || process.env.PW_BASE_URL || {base_url},
  }},
}});
"#,
            timeout = self.settings.test_timeout_ms,
            report = js_str(&self.settings.report_file),
            base_url = js_str(plan.base_url()),
        )
    }

    fn action_line(&self, action: &Action) -> String {
        match action {
            Action::Goto(url) => format!("await page.goto({});", js_str(url)),
            Action::Click(locator) => format!("await {}.click();", self.locator_expression(locator)),
            Action::Fill { locator, value } => format!(
                "await {}.fill({});",
                self.locator_expression(locator),
                js_str(value)
            ),
            Action::ExpectText(text) => format!(
                "await expect(page.getByText({}).first()).toBeVisible();",
                js_str(text)
            ),
            Action::ExpectVisible(locator) => format!(
                "await expect({}).toBeVisible();",
                self.locator_expression(locator)
            ),
            Action::Upload { locator, path } => format!(
                "await {}.setInputFiles({});",
                self.locator_expression(locator),
                js_str(path)
            ),
            Action::Custom(note) => format!("// {}", one_line(note)),
        }
    }

    fn spec_file(&self, page: &PageCases<'_>) -> String {
        let mut out = String::from("import { test, expect } from '@playwright/test';\n\n");
        out.push_str(&format!("// {}\n", render::page_banner(page)));
        for (scenario, actions) in &page.cases {
            out.push_str(&format!(
                "\ntest({}, async ({{ page }}) => {{\n",
                js_str(&scenario.title)
            ));
            for action in actions {
                out.push_str("  ");
                out.push_str(&self.action_line(action));
                out.push('\n');
            }
            out.push_str("});\n");
        }
        out
    }
}

fn runner_args(_: &ArtifactLayout) -> Vec<String> {
    ["playwright", "test", "-c", "playwright.config.ts"]
        .map(String::from)
        .to_vec()
}

impl FrameworkAdapter for PlaywrightAdapter {
    fn id(&self) -> &'static str {
        ID
    }

    fn display_name(&self) -> &'static str {
        "Playwright (TS)"
    }

    fn render(&self, plan: &TestPlan) -> RenderOutput {
        let (pages, failures) = render::prepare(plan);
        let package = json!({
            "name": "testforge-playwright",
            "private": true,
            "scripts": { "test": "playwright test -c playwright.config.ts" },
            "devDependencies": { "@playwright/test": "^1.47.2" },
        });
        let mut files = vec![
            RenderedFile::new("package.json", format!("{package:#}\n")),
            RenderedFile::new("playwright.config.ts", self.config_file(plan)),
        ];
        for page in &pages {
            files.push(RenderedFile::new(
                format!("tests/{}.spec.ts", page.file_stem()),
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
        match locator {
            Locator::Label(label) => format!("page.getByLabel({})", js_str(label)),
            Locator::Placeholder(text) => format!("page.getByPlaceholder({})", js_str(text)),
            Locator::Role { role, name } => format!(
                "page.getByRole({}, {{ name: {} }})",
                js_str(role.as_str()),
                js_str(name)
            ),
            Locator::Text(text) => format!("page.getByText({})", js_str(text)),
            Locator::FirstField => {
                format!("page.locator({}).first()", js_str(render::FIRST_FIELD_CSS))
            }
            Locator::FirstOfRole(role) => format!("page.locator({}).first()", js_str(role.tag())),
            Locator::Name(name) => format!(
                "page.locator({})",
                js_str(&render::attr_selector("", "name", name))
            ),
            Locator::InputType(ty) => format!(
                "page.locator({})",
                js_str(&render::attr_selector("input", "type", ty))
            ),
            Locator::Css(css) => format!("page.locator({})", js_str(css)),
        }
    }
}
