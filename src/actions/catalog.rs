/// Built-in remediation script templates.
///
/// Each template is a POSIX `sh` body plus a description line. Both use
/// `{{name}}` placeholders; every placeholder is declared in the
/// template's parameter schema so the synthesizer can render values by
/// type (quoted text, plain numbers, normalized paths).
///
/// Placeholders only ever appear on the right-hand side of a variable
/// assignment in the body. The script then works with `"$var"`, never
/// with the substituted text directly.
use std::collections::HashMap;
use std::fmt;

use super::ActionKind;
use crate::error::{RemediationError, Result};

/// Type of a template parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    Number,
    Path,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamKind::Text => "text",
            ParamKind::Number => "a number",
            ParamKind::Path => "a path",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ActionTemplate {
    pub kind: ActionKind,
    /// Human-readable summary shown in the approval queue
    pub description: &'static str,
    /// Script body handed to the interpreter
    pub body: &'static str,
    pub params: &'static [(&'static str, ParamKind)],
}

impl ActionTemplate {
    /// Declared type of a placeholder, if the schema knows it.
    pub fn param_kind(&self, name: &str) -> Option<ParamKind> {
        self.params
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, kind)| *kind)
    }
}

const HIGH_CPU: ActionTemplate = ActionTemplate {
    kind: ActionKind::HighCpu,
    description: "Kill {{process}} (CPU>{{threshold}}%)",
    body: r#"#!/bin/sh
target={{process}}
limit={{threshold}}
pid={{pid}}
name=$(ps -o comm= -p "$pid" 2>/dev/null)
short=$(printf '%.15s' "$target")
if [ "$name" != "$target" ] && [ "$name" != "$short" ]; then
    echo "Process $pid is no longer $target, nothing killed" >&2
    exit 1
fi
if ! kill -9 "$pid"; then
    echo "Could not kill $target ($pid)" >&2
    exit 1
fi
echo "Killed $target ($pid) above $limit% CPU"
"#,
    params: &[
        ("process", ParamKind::Text),
        ("threshold", ParamKind::Number),
        ("pid", ParamKind::Number),
    ],
};

const HIGH_MEMORY: ActionTemplate = ActionTemplate {
    kind: ActionKind::HighMemory,
    description: "Kill {{process}} (Mem>{{threshold_mb}}MB)",
    body: r#"#!/bin/sh
target={{process}}
limit={{threshold_mb}}
killed=$(ps -A -o pid= -o rss= -o comm= | while read -r pid rss name; do
    if [ "$name" = "$target" ] && awk -v r="$rss" -v t="$limit" 'BEGIN { exit !(r / 1024 > t) }'; then
        kill -9 "$pid" && echo "Killed $name ($pid) at $rss KB resident"
    fi
done)
if [ -z "$killed" ]; then
    echo "No $target process above $limit MB, nothing killed" >&2
    exit 1
fi
echo "$killed"
"#,
    params: &[
        ("process", ParamKind::Text),
        ("threshold_mb", ParamKind::Number),
    ],
};

const CLEANUP_TEMP: ActionTemplate = ActionTemplate {
    kind: ActionKind::CleanupTemp,
    description: "Cleanup Temp Folder",
    body: r#"#!/bin/sh
dir={{path}}
if [ ! -d "$dir" ]; then
    echo "Not a directory: $dir" >&2
    exit 1
fi
find "$dir" -mindepth 1 -maxdepth 1 | while IFS= read -r entry; do
    rm -rf -- "$entry" 2>/dev/null || echo "Skipped $entry" >&2
done
echo "Temp folder cleaned"
"#,
    params: &[("path", ParamKind::Path)],
};

// freedesktop.org trash layout: files/, info/, expunged/
const CLEANUP_RECYCLE: ActionTemplate = ActionTemplate {
    kind: ActionKind::CleanupRecycleBin,
    description: "Empty Recycle Bin",
    body: r#"#!/bin/sh
trash={{path}}
for sub in files info expunged; do
    [ -d "$trash/$sub" ] || continue
    find "$trash/$sub" -mindepth 1 -maxdepth 1 | while IFS= read -r entry; do
        rm -rf -- "$entry" 2>/dev/null || echo "Skipped $entry" >&2
    done
done
echo "Recycle bin emptied"
"#,
    params: &[("path", ParamKind::Path)],
};

/// Read-only map from [`ActionKind`] to its template.
#[derive(Debug, Clone)]
pub struct Catalog {
    templates: HashMap<ActionKind, ActionTemplate>,
}

impl Catalog {
    /// The four built-in templates.
    pub fn builtin() -> Self {
        Self::with_kinds(&ActionKind::ALL)
    }

    /// A catalog restricted to a subset of the built-in kinds.
    pub fn with_kinds(kinds: &[ActionKind]) -> Self {
        let templates = [HIGH_CPU, HIGH_MEMORY, CLEANUP_TEMP, CLEANUP_RECYCLE]
            .into_iter()
            .filter(|t| kinds.contains(&t.kind))
            .map(|t| (t.kind, t))
            .collect();
        Self { templates }
    }

    pub fn template(&self, kind: ActionKind) -> Result<&ActionTemplate> {
        self.templates
            .get(&kind)
            .ok_or_else(|| RemediationError::UnknownKind(kind.to_string()))
    }
}
