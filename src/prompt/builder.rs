//! Prompt Builder - interpolate the iteration prompt with Handlebars
//!
//! Building never fails: Handlebars runs in non-strict mode so unknown
//! placeholders render empty, and a template Handlebars rejects falls back to
//! plain `{{name}}` substitution.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use handlebars::Handlebars;
use log::warn;
use regex::{Captures, Regex};

/// Values available to the prompt template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptVariables {
    pub spec: String,
    /// Serialized task list
    pub plan: String,
    /// Feedback from failing checks and agent errors
    pub backpressure: Option<String>,
    pub iteration: u32,
    pub remaining_budget_usd: Option<f64>,
    pub remaining_iterations: Option<u32>,
}

impl PromptVariables {
    /// Placeholder name to rendered value, aliases included
    pub fn context(&self) -> BTreeMap<&'static str, String> {
        let budget = self
            .remaining_budget_usd
            .map(|b| format!("{:.2}", b.max(0.0)))
            .unwrap_or_default();
        let iterations = self
            .remaining_iterations
            .map(|i| i.to_string())
            .unwrap_or_default();

        let mut context = BTreeMap::new();
        context.insert("spec", self.spec.clone());
        context.insert("plan", self.plan.clone());
        context.insert("backpressure", self.backpressure.clone().unwrap_or_default());
        context.insert("iteration", self.iteration.to_string());
        context.insert("remaining_budget_usd", budget.clone());
        context.insert("remainingBudgetUsd", budget);
        context.insert("remaining_iterations", iterations.clone());
        context.insert("remainingIterations", iterations);
        context
    }
}

/// Builds iteration prompts from a template
pub struct PromptBuilder {
    handlebars: Handlebars<'static>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render `template` with `variables`. Deterministic.
    pub fn build(&self, template: &str, variables: &PromptVariables) -> String {
        let context = variables.context();
        match self.handlebars.render_template(template, &context) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!("prompt template rejected by handlebars, using plain substitution: {}", e);
                substitute(template, &context)
            }
        }
    }
}

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex"));

/// `{{name}}` replacement without any block syntax; unknown names become empty
fn substitute(template: &str, context: &BTreeMap<&'static str, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            context.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}
