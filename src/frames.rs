//! Stack & frame builder: merges the statement-level location,
//! expression-level frames, and the logical return stack into one DAP call
//! stack.

use crate::host::{ExprFrame, LabelSite, StatementKind, StatementNode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Longest dialogue text shown verbatim in a frame name before truncation.
const SAY_TRUNCATE_LEN: usize = 40;

/// One DAP stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Monotonic frame id, unique within one `stackTrace` response.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Absolute source path.
    pub source_path: PathBuf,
    /// Basename of `source_path`, for display.
    pub source_name: String,
    /// 1-based line number.
    pub line: u32,
    /// Column; always 0 (unused).
    pub column: u32,
}

/// Resolve a possibly-relative, possibly-URI-prefixed path against the game
/// base directory.
#[must_use]
pub fn resolve_path(raw: &str, game_base: &Path) -> PathBuf {
    let stripped = raw.strip_prefix("file://").unwrap_or(raw);
    let candidate = Path::new(stripped);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        game_base.join(candidate)
    }
}

/// Whether `file` belongs to the game (as opposed to debugger/runtime
/// internals), recognized by absolute prefix match against `game_base` or by
/// carrying `script_ext` (e.g. `.rpy`).
#[must_use]
pub fn is_game_file(file: &str, game_base: &Path, script_ext: &str) -> bool {
    if file.ends_with(script_ext) {
        return true;
    }
    Path::new(file).starts_with(game_base)
}

fn truncate_say(what: &str) -> String {
    if what.chars().count() <= SAY_TRUNCATE_LEN {
        what.to_string()
    } else {
        let truncated: String = what.chars().take(SAY_TRUNCATE_LEN).collect();
        format!("{truncated}…")
    }
}

fn statement_frame_name(node: &StatementNode) -> String {
    match &node.kind {
        StatementKind::Say { what } => format!("say \"{}\"", truncate_say(what)),
        StatementKind::Jump { target } => format!("jump {target}"),
        StatementKind::Call { target } => format!("call {target}"),
        StatementKind::Label { name } => format!("label {name}"),
        StatementKind::Return => "return".to_string(),
        StatementKind::Show { .. } => "show".to_string(),
        StatementKind::Hide { .. } => "hide".to_string(),
        StatementKind::ShowScreen { .. } => "show screen".to_string(),
        StatementKind::HideScreen { .. } => "hide screen".to_string(),
        StatementKind::Other { kind } => kind.to_lowercase(),
    }
}

/// Build the full DAP stack, innermost first:
///
/// 1. the current statement-level location, if any;
/// 2. expression frames above it that belong to game files;
/// 3. one pseudo-frame per label on the return stack (outermost last).
#[must_use]
pub fn build_stack(
    current_statement: Option<&StatementNode>,
    expression_frames: &[ExprFrame],
    return_stack: &[String],
    label_map: &HashMap<String, LabelSite>,
    game_base: &Path,
    script_ext: &str,
) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let mut next_id = 1u32;

    if let Some(node) = current_statement {
        let path = resolve_path(&node.filename, game_base);
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| node.filename.clone());
        frames.push(StackFrame {
            id: next_id,
            name: statement_frame_name(node),
            source_path: path,
            source_name,
            line: node.line,
            column: 0,
        });
        next_id += 1;
    }

    for frame in expression_frames {
        if !is_game_file(&frame.file, game_base, script_ext) {
            continue;
        }
        let path = resolve_path(&frame.file, game_base);
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| frame.file.clone());
        frames.push(StackFrame {
            id: next_id,
            name: frame.name.clone(),
            source_path: path,
            source_name,
            line: frame.line,
            column: 0,
        });
        next_id += 1;
    }

    for label in return_stack {
        let Some(site) = label_map.get(label) else {
            continue;
        };
        let path = resolve_path(&site.file, game_base);
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| site.file.clone());
        frames.push(StackFrame {
            id: next_id,
            name: format!("return to {label}"),
            source_path: path,
            source_name,
            line: site.line,
            column: 0,
        });
        next_id += 1;
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_map() -> HashMap<String, LabelSite> {
        let mut m = HashMap::new();
        m.insert(
            "chapter1".to_string(),
            LabelSite {
                file: "chapter1.rpy".to_string(),
                line: 5,
            },
        );
        m
    }

    #[test]
    fn say_frame_is_truncated_and_quoted() {
        let node = StatementNode {
            filename: "s.rpy".to_string(),
            line: 10,
            kind: StatementKind::Say {
                what: "a".repeat(80),
            },
        };
        let frames = build_stack(Some(&node), &[], &[], &HashMap::new(), Path::new("/g"), ".rpy");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].name.starts_with("say \""));
        assert!(frames[0].name.ends_with('…'));
        assert_eq!(frames[0].id, 1);
        assert_eq!(frames[0].line, 10);
    }

    #[test]
    fn non_game_expression_frames_are_hidden() {
        let node = StatementNode {
            filename: "/g/s.rpy".to_string(),
            line: 1,
            kind: StatementKind::Other { kind: "If".to_string() },
        };
        let exprs = vec![
            ExprFrame {
                name: "eval".to_string(),
                file: "/g/s.rpy".to_string(),
                line: 2,
            },
            ExprFrame {
                name: "internal".to_string(),
                file: "/runtime/internals.py".to_string(),
                line: 99,
            },
        ];
        let frames = build_stack(Some(&node), &exprs, &[], &HashMap::new(), Path::new("/g"), ".rpy");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].name, "eval");
    }

    #[test]
    fn return_stack_produces_pseudo_frames_with_resolved_sites() {
        let return_stack = vec!["chapter1".to_string(), "unknown".to_string()];
        let frames = build_stack(None, &[], &return_stack, &label_map(), Path::new("/g"), ".rpy");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name, "return to chapter1");
        assert_eq!(frames[0].line, 5);
        assert_eq!(frames[0].source_path, Path::new("/g/chapter1.rpy"));
    }

    #[test]
    fn frame_ids_are_monotonic_across_all_three_sources() {
        let node = StatementNode {
            filename: "/g/s.rpy".to_string(),
            line: 1,
            kind: StatementKind::Label { name: "start".to_string() },
        };
        let exprs = vec![ExprFrame {
            name: "f".to_string(),
            file: "/g/s.rpy".to_string(),
            line: 2,
        }];
        let return_stack = vec!["chapter1".to_string()];
        let frames = build_stack(
            Some(&node),
            &exprs,
            &return_stack,
            &label_map(),
            Path::new("/g"),
            ".rpy",
        );
        let ids: Vec<u32> = frames.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
