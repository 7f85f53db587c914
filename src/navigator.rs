//! Navigator: `gotoTargets`/`goto`, `jumpToLabel`, and `runToLine`.
//!
//! Goto target ids are derived by hashing the label name and masking to 31
//! bits, so they round-trip through a plain client-visible integer without a
//! side table.

use crate::frames::resolve_path;
use crate::host::LabelSite;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// One entry in a `gotoTargets` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GotoTarget {
    /// Stable id, derived from the label name so `goto` can reverse it
    /// without any side table.
    pub id: i64,
    /// Label name (shown to the user as the target's label).
    pub label: String,
    /// 1-based line number the label is defined at.
    pub line: u32,
    /// The label's file, when it differs from the file `gotoTargets` was
    /// asked about.
    pub instruction_pointer_reference: Option<String>,
}

/// A stable, always-positive 31-bit id for `label`. Computed directly from
/// the name so the index needs no id ↔ label table.
#[must_use]
pub fn label_hash(label: &str) -> i64 {
    let mut hasher = DefaultHasher::new();
    label.hash(&mut hasher);
    (hasher.finish() & 0x7FFF_FFFF) as i64
}

/// Build the `gotoTargets` list for `source_file`: every known public label
/// (name not starting with `_`), resolved to an absolute path and sorted so
/// labels in `source_file` itself come first, then ordered by line.
#[must_use]
pub fn goto_targets(
    source_file: &str,
    label_map: &HashMap<String, LabelSite>,
    game_base: &Path,
) -> Vec<GotoTarget> {
    let wanted = resolve_path(source_file, game_base);

    let mut targets: Vec<(bool, u32, GotoTarget)> = label_map
        .iter()
        .filter(|(label, _)| !label.starts_with('_'))
        .map(|(label, site)| {
            let same_file = resolve_path(&site.file, game_base) == wanted;
            (
                !same_file,
                site.line,
                GotoTarget {
                    id: label_hash(label),
                    label: label.clone(),
                    line: site.line,
                    instruction_pointer_reference: (!same_file).then(|| site.file.clone()),
                },
            )
        })
        .collect();

    targets.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    targets.into_iter().map(|(_, _, target)| target).collect()
}

/// Reverse a `goto` request's `targetId` back into a label name, by scanning
/// the label map for a hash match.
#[must_use]
pub fn resolve_goto_target<'a>(target_id: i64, label_map: &'a HashMap<String, LabelSite>) -> Option<&'a str> {
    label_map
        .keys()
        .find(|label| label_hash(label) == target_id)
        .map(String::as_str)
}

/// Whether `label` is a label this host knows about (`jumpToLabel`
/// validation).
#[must_use]
pub fn label_exists(label: &str, label_map: &HashMap<String, LabelSite>) -> bool {
    label_map.contains_key(label)
}

/// The label enclosing `(file, line)`: the label defined in `file` whose
/// line is the greatest one at or below `line`. Used by `runToLine` to
/// decide whether it needs to jump before running, since a target line past
/// the current label's end otherwise never gets reached by plain resume.
#[must_use]
pub fn enclosing_label(
    file: &str,
    line: u32,
    label_map: &HashMap<String, LabelSite>,
    game_base: &Path,
) -> Option<String> {
    let wanted = resolve_path(file, game_base);
    label_map
        .iter()
        .filter(|(_, site)| resolve_path(&site.file, game_base) == wanted && site.line <= line)
        .max_by_key(|(_, site)| site.line)
        .map(|(label, _)| label.clone())
}
