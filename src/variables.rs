//! Variable inspector: scopes, variable-reference allocation and expansion,
//! formatting, mutation, evaluation, and completions.
//!
//! Variable references are allocated from a flat counter starting past the
//! three reserved scope ids, rather than ranges keyed by stack frame, since
//! this engine exposes exactly three named scopes regardless of call depth.

use crate::host::{EvalContext, EvalOutcome, ScriptHost};
use crate::value::{TypedValue, ValueShape};
use std::collections::HashMap;

/// The locals of the innermost active expression frame.
pub const SCOPE_LOCALS: i64 = 1;
/// The script's persistent named-variable store.
pub const SCOPE_STORE: i64 = 2;
/// The host's global/builtin namespace.
pub const SCOPE_GLOBALS: i64 = 3;

const FIRST_DYNAMIC_REF: i64 = 1000;
/// Rows shown per scope or expanded reference, beyond which entries are
/// silently dropped (matches `variables.py`'s `MAX_ITEMS`).
const MAX_ITEMS: usize = 100;
/// Expansion depth cap: a reference allocated at `MAX_DEPTH` is rendered with
/// `variables_reference: 0`, i.e. a leaf, even if its shape is composite.
const MAX_DEPTH: u32 = 3;
/// Longest string scalar rendered verbatim before truncation.
const MAX_STRING_LEN: usize = 1000;

/// A DAP `Scope` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDescriptor {
    /// Display name (`"Locals"`, `"Store"`, `"Globals"`).
    pub name: String,
    /// One of the `SCOPE_*` constants.
    pub variables_reference: i64,
    /// Whether fetching this scope's variables is expected to be slow.
    pub expensive: bool,
}

/// A single formatted row, ready to serialize into a DAP `Variable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRow {
    /// Display name (attribute name, dict key repr, or sequence index).
    pub name: String,
    /// Formatted display value.
    pub value: String,
    /// Runtime type name.
    pub type_name: String,
    /// Nonzero iff expandable; pass to a later `variables` request.
    pub variables_reference: i64,
}

struct RefEntry {
    value: TypedValue,
    /// Expression reaching this value from its scope root, or empty if the
    /// value has no assignable path (e.g. a `Set` element).
    path: String,
    depth: u32,
}

/// Allocates variable-reference ids and expands/mutates the values behind
/// them. One instance per debug session; cleared whenever execution resumes,
/// since reference ids are only meaningful while the host is paused.
#[derive(Default)]
pub struct VariableInspector {
    references: HashMap<i64, RefEntry>,
    next_ref: i64,
}

impl VariableInspector {
    /// Create an inspector with an empty reference table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            references: HashMap::new(),
            next_ref: FIRST_DYNAMIC_REF,
        }
    }

    /// Drop every allocated reference. Call this on every resume (continue,
    /// step, goto, rollback): reference ids are only valid for the pause they
    /// were produced during.
    pub fn clear(&mut self) {
        self.references.clear();
        self.next_ref = FIRST_DYNAMIC_REF;
    }

    /// The scopes to report for a `scopes` request. `has_locals` should
    /// reflect whether the host is currently inside an expression frame
    /// (empty `HostContext::expression_frames` means no Locals scope).
    #[must_use]
    pub fn scopes(has_locals: bool) -> Vec<ScopeDescriptor> {
        let mut scopes = Vec::with_capacity(3);
        if has_locals {
            scopes.push(ScopeDescriptor {
                name: "Locals".to_string(),
                variables_reference: SCOPE_LOCALS,
                expensive: false,
            });
        }
        scopes.push(ScopeDescriptor {
            name: "Store".to_string(),
            variables_reference: SCOPE_STORE,
            expensive: false,
        });
        scopes.push(ScopeDescriptor {
            name: "Globals".to_string(),
            variables_reference: SCOPE_GLOBALS,
            expensive: true,
        });
        scopes
    }

    /// Resolve a `variables` request's `variablesReference` into rows,
    /// fetching top-level scope content from the host or expanding a
    /// previously allocated reference.
    pub async fn variables(&mut self, host: &dyn ScriptHost, reference: i64) -> Vec<VariableRow> {
        match reference {
            SCOPE_LOCALS => {
                let bindings = host.locals().await;
                self.rows_for_bindings(bindings, "", true)
            }
            SCOPE_STORE => {
                let bindings = host.store_variables().await;
                self.rows_for_bindings(bindings, "", true)
            }
            SCOPE_GLOBALS => {
                let bindings = host.global_variables().await;
                self.rows_for_bindings(bindings, "", false)
            }
            _ => {
                let Some(entry) = self.references.get(&reference) else {
                    return Vec::new();
                };
                let value = entry.value.clone();
                let path = entry.path.clone();
                let depth = entry.depth;
                self.rows_for_shape(&value.shape, &path, depth)
            }
        }
    }

    fn rows_for_bindings(
        &mut self,
        bindings: Vec<(String, TypedValue)>,
        path_prefix: &str,
        mutable: bool,
    ) -> Vec<VariableRow> {
        let total = bindings.len();
        let mut rows: Vec<VariableRow> = bindings
            .into_iter()
            .take(MAX_ITEMS)
            .map(|(name, value)| {
                let path = if mutable {
                    format!("{path_prefix}{name}")
                } else {
                    String::new()
                };
                self.row(name, path, value, 0)
            })
            .collect();
        push_sentinel_if_truncated(&mut rows, total, "(N more items)");
        rows
    }

    fn rows_for_shape(&mut self, shape: &ValueShape, path: &str, depth: u32) -> Vec<VariableRow> {
        match shape {
            ValueShape::Mapping(items) => {
                let mut rows: Vec<VariableRow> = items
                    .iter()
                    .take(MAX_ITEMS)
                    .map(|(key, value)| {
                        let child_path = mutable_path(path, &format!("[{key}]"));
                        self.row(key.clone(), child_path, value.clone(), depth)
                    })
                    .collect();
                push_sentinel_if_truncated(&mut rows, items.len(), "(N more items)");
                rows
            }
            ValueShape::Sequence(items) => {
                let mut rows: Vec<VariableRow> = items
                    .iter()
                    .take(MAX_ITEMS)
                    .enumerate()
                    .map(|(index, value)| {
                        let child_path = mutable_path(path, &format!("[{index}]"));
                        self.row(index.to_string(), child_path, value.clone(), depth)
                    })
                    .collect();
                push_sentinel_if_truncated(&mut rows, items.len(), "(N more items)");
                rows
            }
            ValueShape::Set(items) => {
                let mut rows: Vec<VariableRow> = items
                    .iter()
                    .take(MAX_ITEMS)
                    .enumerate()
                    .map(|(index, value)| self.row(format!("[{index}]"), String::new(), value.clone(), depth))
                    .collect();
                push_sentinel_if_truncated(&mut rows, items.len(), "(N more items)");
                rows
            }
            ValueShape::Object(attrs) => {
                let mut rows: Vec<VariableRow> = attrs
                    .iter()
                    .take(MAX_ITEMS)
                    .map(|(name, value)| {
                        let child_path = mutable_path(path, &format!(".{name}"));
                        self.row(name.clone(), child_path, value.clone(), depth)
                    })
                    .collect();
                push_sentinel_if_truncated(&mut rows, attrs.len(), "(N more attributes)");
                rows
            }
            _ => Vec::new(),
        }
    }

    fn row(&mut self, name: String, path: String, value: TypedValue, depth: u32) -> VariableRow {
        let display = format_value(&value);
        let type_name = value.type_name.clone();
        let variables_reference = if value.is_expandable() && depth < MAX_DEPTH {
            let id = self.next_ref;
            self.next_ref += 1;
            self.references.insert(
                id,
                RefEntry {
                    value,
                    path,
                    depth: depth + 1,
                },
            );
            id
        } else {
            0
        };
        VariableRow {
            name,
            value: display,
            type_name,
            variables_reference,
        }
    }

    /// Handle a `setVariable` request: `container` is a scope id or a
    /// previously allocated reference; `name` identifies the member within
    /// it (ignored for references, whose own path already names one slot —
    /// callers pass the reference of the *parent*, same as DAP's contract).
    pub async fn set_variable(
        &mut self,
        host: &dyn ScriptHost,
        container: i64,
        name: &str,
        value_expr: &str,
    ) -> EvalOutcome {
        match container {
            SCOPE_LOCALS => host.set_local(name, value_expr).await,
            SCOPE_STORE => host.exec(&format!("{name} = {value_expr}")).await,
            SCOPE_GLOBALS => host.set_global(name, value_expr).await,
            _ => {
                let Some(entry) = self.references.get(&container) else {
                    return EvalOutcome::Error("unknown variablesReference".to_string());
                };
                if entry.path.is_empty() {
                    return EvalOutcome::Error("value is not assignable".to_string());
                }
                let target = match &entry.value.shape {
                    ValueShape::Object(_) => format!("{}.{name}", entry.path),
                    _ => format!("{}[{name}]", entry.path),
                };
                host.exec(&format!("{target} = {value_expr}")).await
            }
        }
    }

    /// Handle a `setExpression` request: assign `value_expr` to the
    /// l-value `expression` directly, in the script's store.
    pub async fn set_expression(host: &dyn ScriptHost, expression: &str, value_expr: &str) -> EvalOutcome {
        host.exec(&format!("{expression} = {value_expr}")).await
    }

    /// Handle an `evaluate` request. In `repl` context, an expression that
    /// fails to parse at all is retried as a bare statement via `exec` — the
    /// debug console accepts both `x + 1` and `x = x + 1` — and a successful
    /// statement reports back as the literal `"OK"` rather than an empty
    /// value. `watch`/`hover` never fall back; error formatting for any
    /// outcome that still carries one is the caller's job (§4.F / §7).
    pub async fn evaluate(host: &dyn ScriptHost, expression: &str, context: EvalContext) -> EvalOutcome {
        let outcome = host.eval(expression, context).await;
        match outcome {
            EvalOutcome::SyntaxError(_) if context == EvalContext::Repl => {
                match host.exec(expression).await {
                    EvalOutcome::Ok => EvalOutcome::Value(TypedValue::raw("statement", "OK")),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Handle a `completions` request: `text` is the debug console's current
    /// input line and `column` the 1-based DAP cursor column. A dot before
    /// the cursor switches to attribute completion on the evaluated
    /// left-hand side; otherwise suggestions come from the store, a small
    /// fixed set of runtime module names, and a fixed builtins list.
    pub async fn completions(host: &dyn ScriptHost, text: &str, column: usize) -> Vec<CompletionTarget> {
        let cut_at = text
            .char_indices()
            .nth(column.saturating_sub(1))
            .map_or(text.len(), |(i, _)| i);
        let text_to_cursor = &text[..cut_at];

        let mut targets = if let Some(last_dot) = text_to_cursor.rfind('.') {
            Self::attribute_completions(host, text_to_cursor, last_dot).await
        } else {
            Self::scope_completions(host, text_to_cursor).await
        };
        targets.sort_by(|a, b| a.label.cmp(&b.label));
        targets.truncate(MAX_COMPLETIONS);
        targets
    }

    async fn attribute_completions(host: &dyn ScriptHost, text: &str, last_dot: usize) -> Vec<CompletionTarget> {
        let obj_expr = &text[..last_dot];
        let attr_prefix = text[last_dot + 1..].to_lowercase();
        let mut targets = Vec::new();
        let EvalOutcome::Value(value) = host.eval(obj_expr, EvalContext::Repl).await else {
            return targets;
        };
        let attrs: &[(String, TypedValue)] = match &value.shape {
            ValueShape::Object(attrs) => attrs,
            ValueShape::Mapping(items) => items,
            _ => return targets,
        };
        for (name, attr_value) in attrs {
            if name.starts_with('_') {
                continue;
            }
            if attr_prefix.is_empty() || name.to_lowercase().starts_with(&attr_prefix) {
                targets.push(CompletionTarget {
                    label: name.clone(),
                    kind: completion_kind_for(&attr_value.type_name),
                });
            }
        }
        targets
    }

    async fn scope_completions(host: &dyn ScriptHost, text: &str) -> Vec<CompletionTarget> {
        let prefix: String = text
            .chars()
            .rev()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let prefix_lower = prefix.to_lowercase();
        let matches_prefix = |name: &str| prefix.is_empty() || name.to_lowercase().starts_with(&prefix_lower);

        let mut targets = Vec::new();
        for (name, value) in host.store_variables().await {
            if name.starts_with('_') || !matches_prefix(&name) {
                continue;
            }
            let lower = value.type_name.to_lowercase();
            if lower.contains("function") || lower.contains("method") || lower == "type" || lower.contains("class") {
                continue;
            }
            targets.push(CompletionTarget { label: name, kind: "variable".to_string() });
        }
        for name in RUNTIME_MODULES {
            if matches_prefix(name) {
                targets.push(CompletionTarget { label: (*name).to_string(), kind: "module".to_string() });
            }
        }
        for name in BUILTIN_NAMES {
            if matches_prefix(name) {
                let kind = if name.starts_with(|c: char| c.is_lowercase()) { "function" } else { "value" };
                targets.push(CompletionTarget { label: (*name).to_string(), kind: kind.to_string() });
            }
        }
        targets
    }
}

/// A single `completions` suggestion (label and DAP `CompletionItemType`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionTarget {
    /// Text to insert.
    pub label: String,
    /// DAP `CompletionItemType` string (`"variable"`, `"module"`, …).
    pub kind: String,
}

/// Fixed runtime module names always offered at scope scope (no dotted prefix).
const RUNTIME_MODULES: &[&str] = &["renpy", "persistent", "config", "store"];

/// Fixed builtins list offered at scope scope, matching the host language's
/// common builtin surface.
const BUILTIN_NAMES: &[&str] = &[
    "len", "str", "int", "float", "bool", "list", "dict", "set", "tuple", "range", "enumerate", "zip", "map",
    "filter", "sum", "min", "max", "abs", "round", "sorted", "reversed", "any", "all", "print", "type",
    "isinstance", "hasattr", "getattr", "setattr", "True", "False", "None",
];

/// Cap on returned completion targets (`variables.py`'s `[:50]` slice).
const MAX_COMPLETIONS: usize = 50;

/// Classifies an attribute's completion kind from its runtime type name;
/// stands in for `callable()`/`isinstance(value, type)` checks since the
/// value view has no reflection of its own.
fn completion_kind_for(type_name: &str) -> String {
    let lower = type_name.to_lowercase();
    if lower.contains("function") || lower.contains("method") {
        "method".to_string()
    } else if lower == "type" || lower.contains("class") {
        "class".to_string()
    } else {
        "property".to_string()
    }
}

fn mutable_path(parent: &str, suffix: &str) -> String {
    if parent.is_empty() {
        String::new()
    } else {
        format!("{parent}{suffix}")
    }
}

/// Appends a non-expandable sentinel row iff `total` exceeds `MAX_ITEMS`,
/// reporting the count left out.
fn push_sentinel_if_truncated(rows: &mut Vec<VariableRow>, total: usize, noun: &str) {
    if total > MAX_ITEMS {
        let hidden = total - MAX_ITEMS;
        let label = noun.replacen('N', &hidden.to_string(), 1);
        rows.push(VariableRow {
            name: "…".to_string(),
            value: label,
            type_name: String::new(),
            variables_reference: 0,
        });
    }
}

/// Render a value the way a `Variable.value`/`evaluate.result` field does:
/// quoted strings, `True`/`False`, collection item counts rather than
/// contents.
pub(crate) fn format_value(value: &TypedValue) -> String {
    match &value.shape {
        ValueShape::None => "None".to_string(),
        ValueShape::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        ValueShape::Int(i) => i.to_string(),
        ValueShape::Float(f) => format_float(*f),
        ValueShape::Str(s) => format!("'{}'", truncate_string(&escape(s))),
        ValueShape::Bytes(b) => format!("b'{}' ({} bytes)", escape(&String::from_utf8_lossy(b)), b.len()),
        ValueShape::Raw(display) => truncate_string(display),
        ValueShape::Mapping(items) => format!("{{{} item(s)}}", items.len()),
        ValueShape::Sequence(items) => format!("[{} item(s)]", items.len()),
        ValueShape::Set(items) => format!("{{{} item(s)}}", items.len()),
        ValueShape::Object(_) => format!("<{}>", value.type_name),
    }
}

fn format_float(f: f64) -> String {
    if f == f.trunc() && f.is_finite() {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

fn truncate_string(s: &str) -> String {
    if s.chars().count() <= MAX_STRING_LEN {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(MAX_STRING_LEN).collect();
        format!("{truncated}...")
    }
}
