use std::path::Path;

use super::{ActionKind, ActionParams, ActionTemplate, Catalog, ParamKind, ParamValue, RemediationAction};
use crate::error::{RemediationError, Result};

/// How a bound value is rendered into the output text.
#[derive(Clone, Copy)]
enum Target {
    /// Shell source: text and paths are quoted
    Script,
    /// Description line shown to the operator: raw values
    Display,
}

/// Binds parameters into catalog templates.
///
/// Side-effect free. Either every placeholder resolves or nothing is
/// produced.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    catalog: Catalog,
}

impl Synthesizer {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn synthesize(&self, kind: ActionKind, params: ActionParams) -> Result<RemediationAction> {
        let template = self.catalog.template(kind)?;
        let source = render(template.body, |name| bind(template, &params, name, Target::Script))?;
        let description = render(template.description, |name| {
            bind(template, &params, name, Target::Display)
        })?;

        Ok(RemediationAction {
            description,
            kind,
            source,
        })
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(Catalog::builtin())
    }
}

/// Canonical forward-slash form of a path.
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Names of the `{{name}}` placeholders in `text`, in order of appearance.
#[cfg(test)]
pub(crate) fn placeholders(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    names
}

fn render<F>(text: &str, mut resolve: F) -> Result<String>
where
    F: FnMut(&str) -> Result<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        out.push_str(&resolve(&after[..end])?);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn bind(template: &ActionTemplate, params: &ActionParams, name: &str, target: Target) -> Result<String> {
    let missing = || RemediationError::MissingParameter {
        kind: template.kind.to_string(),
        name: name.to_string(),
    };
    let expected = template.param_kind(name).ok_or_else(missing)?;
    let value = params.get(name).ok_or_else(missing)?;
    let invalid = || RemediationError::InvalidParameter {
        kind: template.kind.to_string(),
        name: name.to_string(),
        expected: match expected {
            ParamKind::Text => "text without NUL bytes",
            ParamKind::Number => "a finite number",
            ParamKind::Path => "a path",
        },
    };

    let raw = match (expected, value) {
        (ParamKind::Text, ParamValue::Text(text)) => text.clone(),
        (ParamKind::Number, ParamValue::Number(n)) if n.is_finite() => format_number(*n),
        (ParamKind::Path, ParamValue::Path(path)) => normalize_path(path),
        (ParamKind::Path, ParamValue::Text(text)) => normalize_path(Path::new(text)),
        _ => return Err(invalid()),
    };

    match (target, expected) {
        (Target::Display, _) | (Target::Script, ParamKind::Number) => Ok(raw),
        (Target::Script, _) => shlex::try_quote(&raw)
            .map(|quoted| quoted.into_owned())
            .map_err(|_| invalid()),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
