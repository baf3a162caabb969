use std::sync::Arc;

use super::{FrameworkAdapter, RenderOutput, RenderStatus};
use crate::executor::{SharedRunner, StubRunner};
use crate::scenario::{Manifest, TestPlan};
use crate::synthesis::{AriaRole, Locator};

pub const ID: &str = "xctest";

/// XCUITest 어댑터 자리표시자이다. 코드를 만들지 않고 NotImplemented를 보고한다.
#[derive(Debug, Clone, Copy, Default)]
pub struct XcTestAdapter;

impl FrameworkAdapter for XcTestAdapter {
    fn id(&self) -> &'static str {
        ID
    }

    fn display_name(&self) -> &'static str {
        "XCTest (iOS)"
    }

    fn render(&self, _plan: &TestPlan) -> RenderOutput {
        RenderOutput {
            files: Vec::new(),
            manifest: Manifest {
                adapter: ID.to_string(),
                pages: Vec::new(),
                count: 0,
            },
            status: RenderStatus::NotImplemented,
            failures: Vec::new(),
        }
    }

    fn runner(&self) -> SharedRunner {
        Arc::new(StubRunner::new(ID))
    }

    fn locator_expression(&self, locator: &Locator) -> String {
        let query = |collection: &str, key: &str| format!("app.{collection}[{key:?}]");
        match locator {
            Locator::Label(v) | Locator::Placeholder(v) | Locator::Name(v) => {
                query("textFields", v)
            }
            Locator::Role {
                role: AriaRole::Button,
                name,
            } => query("buttons", name),
            Locator::Role {
                role: AriaRole::Link,
                name,
            } => query("links", name),
            Locator::FirstOfRole(AriaRole::Button) => "app.buttons.firstMatch".to_string(),
            Locator::FirstOfRole(AriaRole::Link) => "app.links.firstMatch".to_string(),
            Locator::FirstField => "app.textFields.firstMatch".to_string(),
            Locator::Text(v) => query("staticTexts", v),
            Locator::InputType(v) | Locator::Css(v) => query("otherElements", v),
        }
    }
}
