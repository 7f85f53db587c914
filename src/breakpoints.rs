//! Breakpoint index: path-normalized storage, O(1) rejection on the hot
//! `check` path, and hit-condition/function-breakpoint bookkeeping.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A line breakpoint, keyed by (normalized file, line).
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoint {
    /// Monotonic id, unique for the index's lifetime.
    pub id: u32,
    /// Normalized (canonicalized) file path.
    pub file: PathBuf,
    /// 1-based line number.
    pub line: u32,
    /// Whether the file existed at the time this breakpoint was set.
    pub verified: bool,
    /// Optional condition expression, evaluated in the script store.
    pub condition: Option<String>,
    /// Optional hit-condition string (`">5"`, `"%2"`, bare `"3"`, …).
    pub hit_condition: Option<String>,
    /// Optional logpoint template (`"x={x}"`); when set, the breakpoint never
    /// pauses execution.
    pub log_message: Option<String>,
    /// Number of times this breakpoint's statement has executed since it was
    /// set.
    pub hit_count: u32,
}

impl Breakpoint {
    /// Whether this is a logpoint (never pauses, only emits `output`).
    #[must_use]
    pub fn is_logpoint(&self) -> bool {
        self.log_message.is_some()
    }

    /// The hit-count gate, evaluated against the current `hit_count`.
    ///
    /// Parse errors in the hit-condition string do **not** suppress the
    /// break (the gate is considered satisfied), unlike condition-expression
    /// errors.
    #[must_use]
    pub fn hit_condition_satisfied(&self) -> bool {
        match &self.hit_condition {
            None => true,
            Some(text) => match HitCondition::parse(text) {
                Some(hc) => hc.matches(self.hit_count),
                None => true,
            },
        }
    }
}

/// A breakpoint request as delivered by `setBreakpoints`, before an id or
/// normalized path is assigned.
#[derive(Debug, Clone, Default)]
pub struct BreakpointSpec {
    /// 1-based line number.
    pub line: u32,
    /// Optional condition expression.
    pub condition: Option<String>,
    /// Optional hit-condition string.
    pub hit_condition: Option<String>,
    /// Optional logpoint template.
    pub log_message: Option<String>,
}

/// A function (label) breakpoint.
#[derive(Debug, Clone)]
pub struct FunctionBreakpoint {
    /// Monotonic id.
    pub id: u32,
    /// The label name this breakpoint watches.
    pub label: String,
    /// Optional condition expression.
    pub condition: Option<String>,
    /// Number of times the label has been entered since being set.
    pub hit_count: u32,
}

/// The parsed shape of a hit-condition string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitCondition {
    /// `"> N"`
    GreaterThan(u32),
    /// `">= N"`
    GreaterOrEqual(u32),
    /// `"< N"`
    LessThan(u32),
    /// `"<= N"`
    LessOrEqual(u32),
    /// `"== N"` or bare `"N"`.
    Equal(u32),
    /// `"!= N"`
    NotEqual(u32),
    /// `"% N"` — every Nth hit.
    EveryNth(u32),
}

impl HitCondition {
    /// Parse a hit-condition string. Returns `None` if it doesn't match any
    /// recognized operator form.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix(">=") {
            return rest.trim().parse().ok().map(Self::GreaterOrEqual);
        }
        if let Some(rest) = text.strip_prefix("<=") {
            return rest.trim().parse().ok().map(Self::LessOrEqual);
        }
        if let Some(rest) = text.strip_prefix("==") {
            return rest.trim().parse().ok().map(Self::Equal);
        }
        if let Some(rest) = text.strip_prefix("!=") {
            return rest.trim().parse().ok().map(Self::NotEqual);
        }
        if let Some(rest) = text.strip_prefix('>') {
            return rest.trim().parse().ok().map(Self::GreaterThan);
        }
        if let Some(rest) = text.strip_prefix('<') {
            return rest.trim().parse().ok().map(Self::LessThan);
        }
        if let Some(rest) = text.strip_prefix('%') {
            return rest.trim().parse().ok().map(Self::EveryNth);
        }
        text.parse().ok().map(Self::Equal)
    }

    /// Whether `hit_count` satisfies this condition.
    #[must_use]
    pub fn matches(&self, hit_count: u32) -> bool {
        match *self {
            Self::GreaterThan(n) => hit_count > n,
            Self::GreaterOrEqual(n) => hit_count >= n,
            Self::LessThan(n) => hit_count < n,
            Self::LessOrEqual(n) => hit_count <= n,
            Self::Equal(n) => hit_count == n,
            Self::NotEqual(n) => hit_count != n,
            Self::EveryNth(n) if n > 0 => hit_count % n == 0,
            Self::EveryNth(_) => false,
        }
    }
}

/// Storage and hot-path lookup for line breakpoints and function breakpoints.
pub struct BreakpointIndex {
    game_base: PathBuf,
    path_cache: HashMap<String, PathBuf>,
    by_file: HashMap<PathBuf, HashMap<u32, Breakpoint>>,
    basenames: HashSet<String>,
    function_breakpoints: HashMap<String, FunctionBreakpoint>,
    next_id: u32,
}

impl BreakpointIndex {
    /// Create an empty index rooted at `game_base` (used to resolve relative
    /// paths from `setBreakpoints`).
    #[must_use]
    pub fn new(game_base: PathBuf) -> Self {
        Self {
            game_base,
            path_cache: HashMap::new(),
            by_file: HashMap::new(),
            basenames: HashSet::new(),
            function_breakpoints: HashMap::new(),
            next_id: 1,
        }
    }

    /// Normalize a raw path as the client sent it: absolute paths are
    /// canonicalized directly; relative paths are resolved against the game
    /// base directory first. Results are memoized.
    pub fn normalize(&mut self, raw: &str) -> PathBuf {
        if let Some(cached) = self.path_cache.get(raw) {
            return cached.clone();
        }
        let candidate = Path::new(raw);
        let resolved = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.game_base.join(candidate)
        };
        let normalized = resolved.canonicalize().unwrap_or(resolved);
        self.path_cache.insert(raw.to_string(), normalized.clone());
        normalized
    }

    /// Invalidate the path-normalization cache (called on script reload).
    pub fn invalidate_path_cache(&mut self) {
        self.path_cache.clear();
    }

    /// Replace `raw_file`'s entire breakpoint set atomically, returning the
    /// newly created breakpoints with `verified` set according to whether the
    /// file currently exists (line-level verification is deferred to
    /// execution time).
    pub fn set_breakpoints(&mut self, raw_file: &str, specs: Vec<BreakpointSpec>) -> Vec<Breakpoint> {
        let normalized = self.normalize(raw_file);
        let exists = normalized.exists();

        let mut created = Vec::with_capacity(specs.len());
        let mut line_map = HashMap::with_capacity(specs.len());
        for spec in specs {
            let id = self.next_id;
            self.next_id += 1;
            let bp = Breakpoint {
                id,
                file: normalized.clone(),
                line: spec.line,
                verified: exists,
                condition: spec.condition,
                hit_condition: spec.hit_condition,
                log_message: spec.log_message,
                hit_count: 0,
            };
            created.push(bp.clone());
            line_map.insert(spec.line, bp);
        }

        if line_map.is_empty() {
            self.by_file.remove(&normalized);
        } else {
            self.by_file.insert(normalized, line_map);
        }
        self.rebuild_basenames();
        created
    }

    /// Remove every breakpoint in `raw_file`.
    pub fn clear_file(&mut self, raw_file: &str) {
        let normalized = self.normalize(raw_file);
        self.by_file.remove(&normalized);
        self.rebuild_basenames();
    }

    /// Remove every breakpoint in the index.
    pub fn clear_all(&mut self) {
        self.by_file.clear();
        self.basenames.clear();
    }

    fn rebuild_basenames(&mut self) {
        self.basenames = self
            .by_file
            .keys()
            .filter_map(|p| p.file_name())
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
    }

    /// The hot path, called for every executing statement. Returns a clone of
    /// the matching breakpoint, if any, without mutating hit count (callers
    /// that decide to record a hit use [`BreakpointIndex::record_hit`]).
    ///
    /// Uses the basename set to skip path normalization entirely when the
    /// file's basename has no breakpoints anywhere.
    pub fn check(&mut self, file: &str, line: u32) -> Option<Breakpoint> {
        let basename = Path::new(file).file_name()?.to_string_lossy().into_owned();
        if !self.basenames.contains(&basename) {
            return None;
        }
        let normalized = self.normalize(file);
        self.by_file.get(&normalized)?.get(&line).cloned()
    }

    /// A range variant of [`BreakpointIndex::check`] for statements whose
    /// source spans multiple lines. Returns the first match found scanning
    /// `start..=end`.
    pub fn check_range(&mut self, file: &str, start: u32, end: u32) -> Option<Breakpoint> {
        for line in start..=end {
            if let Some(bp) = self.check(file, line) {
                return Some(bp);
            }
        }
        None
    }

    /// Increment the hit count of the breakpoint at (normalized `file`,
    /// `line`) and return the breakpoint's new state, if it still exists.
    pub fn record_hit(&mut self, file: &str, line: u32) -> Option<Breakpoint> {
        let normalized = self.normalize(file);
        let bp = self.by_file.get_mut(&normalized)?.get_mut(&line)?;
        bp.hit_count += 1;
        Some(bp.clone())
    }

    /// Replace the entire set of function breakpoints, verifying each against
    /// `labels`. Unknown labels come back with `verified = false`.
    pub fn set_function_breakpoints(
        &mut self,
        specs: Vec<(String, Option<String>)>,
        labels: &HashSet<String>,
    ) -> Vec<(FunctionBreakpoint, bool)> {
        self.function_breakpoints.clear();
        let mut result = Vec::with_capacity(specs.len());
        for (label, condition) in specs {
            let id = self.next_id;
            self.next_id += 1;
            let verified = labels.contains(&label);
            let fbp = FunctionBreakpoint {
                id,
                label: label.clone(),
                condition,
                hit_count: 0,
            };
            self.function_breakpoints.insert(label, fbp.clone());
            result.push((fbp, verified));
        }
        result
    }

    /// The function breakpoint watching `label`, if any, with its hit count
    /// incremented.
    pub fn record_function_hit(&mut self, label: &str) -> Option<FunctionBreakpoint> {
        let fbp = self.function_breakpoints.get_mut(label)?;
        fbp.hit_count += 1;
        Some(fbp.clone())
    }

    /// Number of files currently carrying at least one breakpoint.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.by_file.len()
    }

    /// Whether any line or function breakpoint is currently set anywhere.
    /// Drives whether the coordinator installs its expression-level trace.
    #[must_use]
    pub fn has_any(&self) -> bool {
        self.by_file.values().any(|lines| !lines.is_empty()) || !self.function_breakpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(line: u32) -> BreakpointSpec {
        BreakpointSpec {
            line,
            ..Default::default()
        }
    }

    #[test]
    fn hit_condition_operators_match_spec_examples() {
        let gt5 = HitCondition::parse(">5").unwrap();
        assert!(!gt5.matches(5));
        assert!(gt5.matches(6));
        assert!(gt5.matches(7));

        let eq3 = HitCondition::parse("==3").unwrap();
        assert!(!eq3.matches(2));
        assert!(eq3.matches(3));
        assert!(!eq3.matches(4));

        let every2 = HitCondition::parse("%2").unwrap();
        assert!(!every2.matches(1));
        assert!(every2.matches(2));
        assert!(!every2.matches(3));
        assert!(every2.matches(4));

        let bare3 = HitCondition::parse("3").unwrap();
        assert!(!bare3.matches(2));
        assert!(bare3.matches(3));
        assert!(!bare3.matches(4));
    }

    #[test]
    fn check_on_untracked_basename_skips_normalization() {
        let mut index = BreakpointIndex::new(PathBuf::from("/does/not/exist"));
        assert!(index.check("/anything/untouched.rpy", 5).is_none());
        assert!(index.path_cache.is_empty());
    }

    #[test]
    fn set_then_check_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script.rpy");
        std::fs::write(&file, "label start:\n").unwrap();

        let mut index = BreakpointIndex::new(dir.path().to_path_buf());
        let created = index.set_breakpoints(file.to_str().unwrap(), vec![spec(10), spec(20)]);
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|bp| bp.verified));

        assert!(index.check(file.to_str().unwrap(), 10).is_some());
        assert!(index.check(file.to_str().unwrap(), 15).is_none());
        assert!(index.check(file.to_str().unwrap(), 20).is_some());
    }

    #[test]
    fn set_breakpoints_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script.rpy");
        std::fs::write(&file, "label start:\n").unwrap();

        let mut index = BreakpointIndex::new(dir.path().to_path_buf());
        index.set_breakpoints(file.to_str().unwrap(), vec![spec(10)]);
        index.set_breakpoints(file.to_str().unwrap(), vec![spec(99)]);

        assert!(index.check(file.to_str().unwrap(), 10).is_none());
        assert!(index.check(file.to_str().unwrap(), 99).is_some());
    }

    #[test]
    fn unverified_when_file_missing() {
        let mut index = BreakpointIndex::new(PathBuf::from("/tmp"));
        let created = index.set_breakpoints("/tmp/does-not-exist-xyz.rpy", vec![spec(1)]);
        assert!(!created[0].verified);
    }

    #[test]
    fn has_any_reflects_line_and_function_breakpoints() {
        let mut index = BreakpointIndex::new(PathBuf::from("/tmp"));
        assert!(!index.has_any());

        index.set_breakpoints("/tmp/does-not-exist-xyz.rpy", vec![spec(1)]);
        assert!(index.has_any());

        index.set_breakpoints("/tmp/does-not-exist-xyz.rpy", vec![]);
        assert!(!index.has_any());

        let mut labels = HashSet::new();
        labels.insert("start".to_string());
        index.set_function_breakpoints(vec![("start".to_string(), None)], &labels);
        assert!(index.has_any());
    }

    #[test]
    fn function_breakpoints_verify_against_label_map() {
        let mut index = BreakpointIndex::new(PathBuf::from("/tmp"));
        let mut labels = HashSet::new();
        labels.insert("start".to_string());

        let result = index.set_function_breakpoints(
            vec![("start".to_string(), None), ("missing".to_string(), None)],
            &labels,
        );
        assert!(result[0].1);
        assert!(!result[1].1);
    }

    #[test]
    fn hit_condition_parse_error_does_not_suppress_break() {
        let bp = Breakpoint {
            id: 1,
            file: PathBuf::from("/a"),
            line: 1,
            verified: true,
            condition: None,
            hit_condition: Some("not-an-operator".to_string()),
            log_message: None,
            hit_count: 1,
        };
        assert!(bp.hit_condition_satisfied());
    }
}
