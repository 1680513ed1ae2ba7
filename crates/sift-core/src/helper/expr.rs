//! Expression templates.
//!
//! An [`ExprString`] interleaves string literals with expressions delimited
//! by `EXPR(` and `)`. The scanner searches greedily for the last end token
//! within a window bounded by the next start token, so nested calls like
//! `EXPR(env("PATH"))` are captured whole. An unterminated `EXPR(` leaves
//! the remainder of the template as a literal.
//!
//! Expressions are compiled once at build time. The evaluation scope
//! exposes `record`, `labels`, `tags`, and `timestamp` (RFC 3339 string),
//! plus an `env(name)` function for process-environment lookup. Unknown
//! variables resolve to unit instead of failing; a program that yields a
//! non-string value is a render error.

use std::sync::LazyLock;

use rhai::{Dynamic, Engine, ImmutableString, Scope, AST};
use serde::{Deserialize, Serialize};
use sift_entry::{Entry, Value};

use crate::error::{ConfigError, ProcessingError};

const EXPR_START: &str = "EXPR(";
const EXPR_END: &str = ")";

static ENGINE: LazyLock<Engine> = LazyLock::new(|| {
    let mut engine = Engine::new();
    engine.register_fn("env", |name: &str| {
        std::env::var(name).unwrap_or_default()
    });
    // Unknown variables evaluate to unit; the seeded names fall through to
    // the scope.
    engine.on_var(|name, _index, _context| match name {
        "record" | "labels" | "tags" | "timestamp" => Ok(None),
        _ => Ok(Some(Dynamic::UNIT)),
    });
    engine
});

/// The raw template text as it appears in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExprStringConfig(pub String);

impl From<&str> for ExprStringConfig {
    fn from(s: &str) -> Self {
        ExprStringConfig(s.to_string())
    }
}

impl ExprStringConfig {
    /// Splits the template and compiles every embedded expression.
    pub fn build(&self) -> Result<ExprString, ConfigError> {
        let (literals, sources) = split_template(&self.0);
        let programs = sources
            .iter()
            .map(|source| {
                ENGINE
                    .compile_expression(source)
                    .map_err(|err| ConfigError::InvalidExpression(format!("{source}: {err}")))
            })
            .collect::<Result<Vec<AST>, _>>()?;
        Ok(ExprString { literals, programs })
    }
}

/// Splits a template into literals and expression sources, maintaining
/// `literals.len() == expressions.len() + 1`.
fn split_template(template: &str) -> (Vec<String>, Vec<String>) {
    let mut literals = Vec::new();
    let mut expressions = Vec::new();
    let mut range_start = 0;

    loop {
        let index_start = match template[range_start..].find(EXPR_START) {
            // No further start token: the rest is a literal.
            None => {
                literals.push(template[range_start..].to_string());
                break;
            }
            Some(relative) => range_start + relative,
        };

        // Restrict the end-token search to the window before the next start
        // token, then take the last end token in that window.
        let after_start = index_start + EXPR_START.len();
        let range_end = match template[after_start..].find(EXPR_START) {
            None => template.len(),
            Some(relative) => after_start + relative,
        };
        let index_end = match template[index_start..range_end].rfind(EXPR_END) {
            // Unterminated expression: the remainder is a literal.
            None => {
                literals.push(template[range_start..].to_string());
                break;
            }
            Some(relative) => index_start + relative,
        };

        literals.push(template[range_start..index_start].to_string());
        expressions.push(template[after_start..index_end].to_string());
        range_start = index_end + EXPR_END.len();
    }

    (literals, expressions)
}

/// A compiled template: string literals interleaved with compiled programs.
#[derive(Debug, Clone)]
pub struct ExprString {
    literals: Vec<String>,
    programs: Vec<AST>,
}

impl ExprString {
    /// Renders the template against an entry. Every program must yield a
    /// string.
    pub fn render(&self, entry: &Entry) -> Result<String, ProcessingError> {
        let mut out = String::new();
        let mut scope = entry_scope(entry);

        for (literal, program) in self.literals.iter().zip(&self.programs) {
            out.push_str(literal);
            let result = ENGINE
                .eval_ast_with_scope::<Dynamic>(&mut scope, program)
                .map_err(|err| ProcessingError::Render(err.to_string()))?;
            let text: ImmutableString = result.try_cast().ok_or_else(|| {
                ProcessingError::Render("embedded expression returned a non-string value".into())
            })?;
            out.push_str(&text);
        }
        if let Some(last) = self.literals.last() {
            out.push_str(last);
        }
        Ok(out)
    }
}

/// Builds the evaluation scope for one entry. Scopes are never shared
/// across renders, so concurrent renders cannot alias each other's state.
fn entry_scope(entry: &Entry) -> Scope<'static> {
    let mut scope = Scope::new();
    scope.push_dynamic("record", value_to_dynamic(&entry.record));

    let mut labels = rhai::Map::new();
    for (key, value) in &entry.labels {
        labels.insert(key.as_str().into(), Dynamic::from(value.clone()));
    }
    scope.push_dynamic("labels", Dynamic::from_map(labels));

    let tags: rhai::Array = entry
        .tags
        .iter()
        .map(|tag| Dynamic::from(tag.clone()))
        .collect();
    scope.push_dynamic("tags", Dynamic::from_array(tags));

    scope.push_dynamic("timestamp", Dynamic::from(entry.timestamp.to_rfc3339()));
    scope
}

fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => (*b).into(),
        Value::Int(i) => (*i).into(),
        Value::Float(f) => (*f).into(),
        Value::String(s) => s.clone().into(),
        Value::Bytes(b) => Dynamic::from_blob(b.clone()),
        Value::Array(values) => {
            let array: rhai::Array = values.iter().map(value_to_dynamic).collect();
            Dynamic::from_array(array)
        }
        Value::Map(map) => {
            let mut out = rhai::Map::new();
            for (key, value) in map {
                out.insert(key.as_str().into(), value_to_dynamic(value));
            }
            Dynamic::from_map(out)
        }
    }
}
