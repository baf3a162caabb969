use serde_json::json;
use std::sync::Arc;

use super::render::{self, Action, PageCases, js_str, one_line};
use super::{FrameworkAdapter, RenderOutput, RenderSettings};
use crate::executor::{ArtifactLayout, CommandRunner, SharedRunner};
use crate::scenario::{RenderedFile, TestPlan};
use crate::synthesis::Locator;

pub const ID: &str = "cypress-js";

/// Cypress 어댑터이다. Testing Library 명령으로 라벨/역할 로케이터를 표현한다.
#[derive(Debug, Clone)]
pub struct CypressAdapter {
    settings: RenderSettings,
}

impl CypressAdapter {
    pub fn new(settings: RenderSettings) -> Self {
        Self { settings }
    }

    fn config_file(&self, plan: &TestPlan) -> String {
        format!(
            r#"const {{ defineConfig }} = require("cypress");

module.exports = defineConfig({{
  reporter: "json",
  reporterOptions: {{ output: {report} }},
  defaultCommandTimeout: {timeout},
  pageLoadTimeout: {timeout},
  video: false,
  e2e: {{
    baseUrl: process.env.CYPRESS_BASE_URL || process.env.BASE_URL || {base_url},
    specPattern: "cypress/e2e/**/*.cy.js",
    supportFile: "cypress/support/e2e.js",
  }},
}});
"#,
            report = js_str(&self.settings.report_file),
            timeout = self.settings.test_timeout_ms,
            base_url = js_str(plan.base_url()),
        )
    }

    fn action_line(&self, action: &Action) -> String {
        match action {
            Action::Goto(url) => format!("cy.visit({});", js_str(url)),
            Action::Click(locator) => format!("{}.click();", self.locator_expression(locator)),
            Action::Fill { locator, value } if value.is_empty() => {
                format!("{}.clear();", self.locator_expression(locator))
            }
            Action::Fill { locator, value } => format!(
                "{}.clear().type({}, {{ parseSpecialCharSequences: false }});",
                self.locator_expression(locator),
                js_str(value)
            ),
            Action::ExpectText(text) => {
                format!("cy.contains({}).should(\"be.visible\");", js_str(text))
            }
            Action::ExpectVisible(locator) => format!(
                "{}.should(\"be.visible\");",
                self.locator_expression(locator)
            ),
            Action::Upload { locator, path } => format!(
                "{}.selectFile({});",
                self.locator_expression(locator),
                js_str(path)
            ),
            Action::Custom(note) => format!("// {}", one_line(note)),
        }
    }

    fn spec_file(&self, page: &PageCases<'_>) -> String {
        let mut out = format!("// {}\n\ndescribe({}, () => {{\n", render::page_banner(page), js_str(&page.key));
        for (index, (scenario, actions)) in page.cases.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            out.push_str(&format!("  it({}, () => {{\n", js_str(&scenario.title)));
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
}

fn runner_args(_: &ArtifactLayout) -> Vec<String> {
    ["cypress", "run", "--config-file", "cypress.config.js"]
        .map(String::from)
        .to_vec()
}

impl FrameworkAdapter for CypressAdapter {
    fn id(&self) -> &'static str {
        ID
    }

    fn display_name(&self) -> &'static str {
        "Cypress (JS)"
    }

    fn render(&self, plan: &TestPlan) -> RenderOutput {
        let (pages, failures) = render::prepare(plan);
        let package = json!({
            "name": "testforge-cypress",
            "private": true,
            "scripts": { "test": "cypress run --config-file cypress.config.js" },
            "devDependencies": {
                "cypress": "^13.6.0",
                "@testing-library/cypress": "^10.0.1",
            },
        });
        let mut files = vec![
            RenderedFile::new("package.json", format!("{package:#}\n")),
            RenderedFile::new("cypress.config.js", self.config_file(plan)),
            RenderedFile::new(
                "cypress/support/e2e.js",
                "import \"@testing-library/cypress/add-commands\";\n",
            ),
        ];
        for page in &pages {
            files.push(RenderedFile::new(
                format!("cypress/e2e/{}.cy.js", page.file_stem()),
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
            Locator::Label(label) => format!("cy.findByLabelText({})", js_str(label)),
            Locator::Placeholder(text) => format!("cy.findByPlaceholderText({})", js_str(text)),
            Locator::Role { role, name } => format!(
                "cy.findByRole({}, {{ name: {} }})",
                js_str(role.as_str()),
                js_str(name)
            ),
            Locator::Text(text) => format!("cy.contains({})", js_str(text)),
            Locator::FirstField | Locator::FirstOfRole(_) => format!(
                "cy.get({}).first()",
                js_str(&render::css_of(locator).unwrap_or_default())
            ),
            Locator::Name(_) | Locator::InputType(_) | Locator::Css(_) => format!(
                "cy.get({})",
                js_str(&render::css_of(locator).unwrap_or_default())
            ),
        }
    }
}
