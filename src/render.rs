//! Template rendering.
//!
//! The harness only needs "template + one value -> source text". Any
//! engine satisfying [`TemplateEngine`] can be plugged in; [`JinjaEngine`]
//! is the default.

use std::fs;
use std::path::Path;

use minijinja::{context, Environment, UndefinedBehavior};
use serde_json::Value;

use crate::error::RenderError;

pub trait TemplateEngine {
    /// Renders `template` with `item` bound as the only variable.
    fn render(&self, template: &Path, item: &Value) -> Result<String, String>;
}

/// Jinja-syntax templates read from disk on every call. The input is
/// visible as `item`; undefined names are errors.
pub struct JinjaEngine {
    env: Environment<'static>,
}

impl JinjaEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }
}

impl Default for JinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for JinjaEngine {
    fn render(&self, template: &Path, item: &Value) -> Result<String, String> {
        let source =
            fs::read_to_string(template).map_err(|e| format!("cannot read template: {e}"))?;
        self.env
            .render_str(&source, context! { item => minijinja::Value::from_serialize(item) })
            .map_err(|e| format!("{e:#}"))
    }
}

/// Binds an input into a template and tags failures with enough context to
/// reproduce them.
pub struct Renderer<E> {
    engine: E,
}

impl<E: TemplateEngine> Renderer<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn render(&self, template: &Path, item: &Value) -> Result<String, RenderError> {
        self.engine
            .render(template, item)
            .map_err(|message| RenderError {
                template: template.to_path_buf(),
                input: item.to_string(),
                message,
            })
    }
}
