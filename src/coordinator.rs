//! Execution coordinator: the pause/resume latch, the statement-boundary
//! callback, stepping, rollback, exception surfacing, reload handling, and
//! the expression-level trace that lets stepping and breakpoints work inside
//! a single statement's expressions, not just across statement boundaries.
//!
//! Condition/hit-condition evaluation happens on whatever thread the host
//! calls the statement callback from, so it uses `futures::executor::block_on`
//! rather than requiring that thread to be a Tokio worker.

use crate::breakpoints::{BreakpointIndex, BreakpointSpec};
use crate::host::{
    EvalContext, EvalOutcome, HostContext, ScriptHost, StatementControl, StatementNode, StatementKind, TraceEvent,
};
use crate::navigator::enclosing_label;
use crate::value::TypedValue;
use crate::variables::VariableInspector;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Notify};

/// Why execution stopped, mirroring DAP's `StoppedEvent.reason` values this
/// engine can actually produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A `next`/`stepIn`/`stepOut`/`stepBack` completed.
    Step,
    /// A line breakpoint's condition and hit-condition were both satisfied.
    Breakpoint,
    /// A function breakpoint fired on label entry.
    FunctionBreakpoint,
    /// An enabled exception filter matched.
    Exception,
    /// An explicit `pause` request took effect.
    Pause,
    /// A `goto` request landed on its target.
    Goto,
}

/// Coarse lifecycle state, surfaced only for logging; the DAP-visible shape
/// is [`StopReason`] plus the `Paused`/`Running` state itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerState {
    /// No client attached, or the client has disconnected.
    Disconnected,
    /// Executing normally.
    Running,
    /// Halted at a statement boundary, waiting on the pause latch.
    Paused,
    /// Running toward a step-completion condition.
    Stepping,
}

/// An asynchronous notification the coordinator emits; the dispatcher
/// translates these into DAP `event` messages.
#[derive(Debug, Clone)]
pub enum DebugEvent {
    /// Execution stopped and is now paused.
    Stopped {
        /// Why it stopped.
        reason: StopReason,
        /// Ids of line breakpoints that caused the stop, if any.
        hit_breakpoint_ids: Vec<u32>,
        /// Human-readable detail (e.g. the matched exception's message).
        description: Option<String>,
    },
    /// Execution resumed.
    Continued,
    /// A logpoint fired, or the host emitted diagnostic text.
    Output {
        /// DAP output category (`"console"`, `"stdout"`, …).
        category: String,
        /// The text to display.
        text: String,
        /// Source file the output is attributed to, if any.
        file: Option<String>,
        /// 1-based line the output is attributed to, if any.
        line: Option<u32>,
    },
    /// The script reloaded; breakpoints remain set but source locations may
    /// have shifted.
    Reloaded,
    /// The `initialize` handshake completed; the client may now send
    /// `setBreakpoints`/`configurationDone`.
    Initialized,
    /// The session detached (`disconnect`/`terminate`).
    Terminated,
}

/// What triggered the current step, and what condition ends it.
///
/// Statement-level and expression-level call depth are tracked
/// independently (spec.md §4.D), so `Next`/`StepOut` record a start depth
/// for each: the statement callback's stop check uses `stmt_depth`, the
/// expression trace's uses `expr_depth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepMode {
    /// No step in progress; only breakpoints/pause requests stop execution.
    None,
    /// Stop at the next statement/expression-line whose call depth is
    /// `<= start_depth` at its own level.
    Next { stmt_depth: usize, expr_depth: usize },
    /// Stop at the very next statement, regardless of depth.
    StepIn,
    /// Stop at the next statement/expression-line whose call depth is
    /// `< start_depth` at its own level.
    StepOut { stmt_depth: usize, expr_depth: usize },
}

struct ExceptionFilters {
    raised: bool,
    uncaught: bool,
}

impl Default for ExceptionFilters {
    fn default() -> Self {
        Self { raised: false, uncaught: true }
    }
}

/// Where a show/scene/show-screen statement last bound a (layer, tag) or
/// (`"screens"`, `"screen:<name>"`) key in the tracked show/scene statement
/// map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowProvenance {
    /// Source file the statement executed from.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// `"show"` or `"scene"`; `None` for screen entries (ShowScreen carries no
    /// such distinction in the original debugger).
    pub statement_type: Option<&'static str>,
}

/// Ties together the breakpoint index, variable inspector, and script host
/// into a single pausable execution session.
pub struct Coordinator {
    host: Arc<dyn ScriptHost>,
    breakpoints: RwLock<BreakpointIndex>,
    variables: tokio::sync::Mutex<VariableInspector>,
    events_tx: mpsc::UnboundedSender<DebugEvent>,

    paused: AtomicBool,
    pause_requested: AtomicBool,
    resume_notify: Notify,
    step_mode: Mutex<StepMode>,

    /// Whether `install_expression_trace` has been called this session.
    trace_installed: AtomicBool,
    /// Call depth tracked by the expression-level trace's `Call`/`Return`
    /// events, independent of `return_stack.len()`.
    expr_depth: AtomicUsize,
    /// Set once, right after construction, so methods taking only `&self`
    /// (the statement callback) can hand the host an `Arc`-backed closure.
    weak_self: Mutex<Option<Weak<Coordinator>>>,

    exception_filters: RwLock<ExceptionFilters>,
    last_exception_signature: RwLock<Option<String>>,

    pending_control: Mutex<StatementControl>,
    pause_after_jump: AtomicBool,
    current_label: RwLock<Option<String>>,
    current_location: RwLock<Option<(String, u32)>>,
    show_tracker: RwLock<HashMap<(String, String), ShowProvenance>>,
    run_to_line_target: Mutex<Option<String>>,
    debugger_state: RwLock<DebuggerState>,

    game_base: PathBuf,
    script_ext: String,
}

impl Coordinator {
    /// Build a coordinator over `host`, rooted at `game_base` for path
    /// resolution. Returns the coordinator and the event stream dispatch.rs
    /// should forward to the client.
    #[must_use]
    pub fn new(
        host: Arc<dyn ScriptHost>,
        game_base: PathBuf,
        script_ext: String,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DebugEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let coordinator = Arc::new(Self {
            host: host.clone(),
            breakpoints: RwLock::new(BreakpointIndex::new(game_base.clone())),
            variables: tokio::sync::Mutex::new(VariableInspector::new()),
            events_tx,
            paused: AtomicBool::new(false),
            pause_requested: AtomicBool::new(false),
            resume_notify: Notify::new(),
            step_mode: Mutex::new(StepMode::None),
            trace_installed: AtomicBool::new(false),
            expr_depth: AtomicUsize::new(0),
            weak_self: Mutex::new(None),
            exception_filters: RwLock::new(ExceptionFilters::default()),
            last_exception_signature: RwLock::new(None),
            pending_control: Mutex::new(StatementControl::Continue),
            pause_after_jump: AtomicBool::new(false),
            current_label: RwLock::new(None),
            current_location: RwLock::new(None),
            show_tracker: RwLock::new(HashMap::new()),
            run_to_line_target: Mutex::new(None),
            debugger_state: RwLock::new(DebuggerState::Disconnected),
            game_base,
            script_ext,
        });

        *coordinator.weak_self.lock() = Some(Arc::downgrade(&coordinator));

        let callback_target = Arc::clone(&coordinator);
        host.register_statement_callback(Arc::new(move |node: &StatementNode| callback_target.on_statement(node)));

        let reload_target = Arc::clone(&coordinator);
        host.on_reload(Box::new(move || reload_target.on_reload()));

        (coordinator, events_rx)
    }

    /// The breakpoint index, for `setBreakpoints`/`setFunctionBreakpoints`
    /// handlers in the dispatcher.
    #[must_use]
    pub fn breakpoints(&self) -> &RwLock<BreakpointIndex> {
        &self.breakpoints
    }

    /// The variable inspector, for `scopes`/`variables`/`setVariable`/
    /// `setExpression`/`evaluate` handlers.
    #[must_use]
    pub fn variables(&self) -> &tokio::sync::Mutex<VariableInspector> {
        &self.variables
    }

    /// The script host, for handlers that need direct access (completions,
    /// exception info, label map for `gotoTargets`/`runToLine`).
    #[must_use]
    pub fn host(&self) -> &Arc<dyn ScriptHost> {
        &self.host
    }

    /// Whether the host is currently paused at a statement boundary.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Replace the enabled exception breakpoint filters (`setExceptionBreakpoints`).
    pub fn set_exception_filters(&self, filter_ids: &[String]) {
        let mut filters = self.exception_filters.write();
        filters.raised = filter_ids.iter().any(|f| f == "raised");
        filters.uncaught = filter_ids.iter().any(|f| f == "uncaught");
    }

    /// `continue`: clear step mode, drop stale variable references, and wake
    /// the paused statement callback.
    pub async fn resume(&self) {
        *self.step_mode.lock() = StepMode::None;
        self.resume_common().await;
    }

    /// `next`: run until a statement at the same or shallower call depth.
    pub async fn step_next(&self) {
        let stmt_depth = self.current_context_depth();
        let expr_depth = self.expr_depth.load(Ordering::SeqCst);
        *self.step_mode.lock() = StepMode::Next { stmt_depth, expr_depth };
        self.resume_common().await;
        *self.debugger_state.write() = DebuggerState::Stepping;
    }

    /// `stepIn`: run until the very next statement.
    pub async fn step_in(&self) {
        *self.step_mode.lock() = StepMode::StepIn;
        self.resume_common().await;
        *self.debugger_state.write() = DebuggerState::Stepping;
    }

    /// `stepOut`: run until the call depth drops below the current one.
    pub async fn step_out(&self) {
        let stmt_depth = self.current_context_depth();
        let expr_depth = self.expr_depth.load(Ordering::SeqCst);
        *self.step_mode.lock() = StepMode::StepOut { stmt_depth, expr_depth };
        self.resume_common().await;
        *self.debugger_state.write() = DebuggerState::Stepping;
    }

    /// `pause`: request a stop at the next statement boundary, without
    /// waking anything that's already paused.
    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
        self.host.post_tick();
    }

    /// `stepBack`/`reverseContinue`: roll the host back one checkpoint and
    /// report a fresh stop. Both commands behave identically here, as a
    /// single checkpoint step backward.
    ///
    /// # Errors
    ///
    /// Propagates the host's rollback failure (e.g. no prior checkpoint).
    pub async fn step_back(&self) -> anyhow::Result<()> {
        if !self.host.rollback_supported() {
            anyhow::bail!("host does not support rollback");
        }
        self.host.rollback_one_checkpoint().await?;
        self.variables.lock().await.clear();
        self.paused.store(true, Ordering::SeqCst);
        *self.debugger_state.write() = DebuggerState::Paused;
        let _ = self.events_tx.send(DebugEvent::Stopped {
            reason: StopReason::Step,
            hit_breakpoint_ids: Vec::new(),
            description: None,
        });
        Ok(())
    }

    /// `goto`/`jumpToLabel`: stash the jump as pending control, resume, and
    /// nudge the host out of any idle interaction via skip mode. When
    /// `pause_after` is set (a plain client-issued `goto`, as opposed to
    /// `runToLine`'s internal jump), the statement callback pauses again with
    /// reason `goto` as soon as it lands.
    pub async fn request_goto(&self, label: String, pause_after: bool) {
        *self.pending_control.lock() = StatementControl::JumpTo(label);
        self.pause_after_jump.store(pause_after, Ordering::SeqCst);
        self.host.set_skip_mode(true);
        self.resume_common().await;
        self.host.post_tick();
    }

    /// `runToLine`: locate the label enclosing `(raw_file, line)`, replace
    /// `raw_file`'s breakpoints with a single temporary one at `line`,
    /// enable skip mode for fast execution, and either jump to that label
    /// (when it differs from the label we're currently paused in) or simply
    /// resume. Whatever breakpoint next causes a pause — the temporary one
    /// or any other the run passes through — tears the temporary breakpoint
    /// back down, mirroring the host's own coarse-grained cleanup (it clears
    /// the whole file's breakpoints, not just the one it added).
    pub async fn run_to_line(&self, raw_file: &str, line: u32) {
        self.breakpoints.write().set_breakpoints(
            raw_file,
            vec![BreakpointSpec { line, ..Default::default() }],
        );
        *self.run_to_line_target.lock() = Some(raw_file.to_string());
        self.host.set_skip_mode(true);

        let target_label = enclosing_label(raw_file, line, &self.host.label_map(), &self.game_base);
        let current = self.current_label.read().clone();
        match target_label {
            Some(label) if Some(&label) != current.as_ref() => {
                self.request_goto(label, false).await;
            }
            _ => self.resume_common().await,
        }
    }

    fn cleanup_temp_breakpoint(&self) {
        if let Some(file) = self.run_to_line_target.lock().take() {
            self.breakpoints.write().clear_file(&file);
        }
        self.host.set_skip_mode(false);
    }

    async fn resume_common(&self) {
        self.variables.lock().await.clear();
        self.pause_requested.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        *self.debugger_state.write() = DebuggerState::Running;
        let _ = self.events_tx.send(DebugEvent::Continued);
        self.resume_notify.notify_one();
    }

    fn current_context_depth(&self) -> usize {
        self.host_context_depth(&self.host.current_context())
    }

    fn host_context_depth(&self, context: &HostContext) -> usize {
        context.return_stack.len()
    }

    fn on_statement(&self, node: &StatementNode) -> StatementControl {
        self.maybe_install_trace();
        self.update_current_label(node);
        *self.current_location.write() = Some((node.filename.clone(), node.line));
        self.track_show_statement(node);
        self.check_reraised_exception();

        if self.pause_after_jump.swap(false, Ordering::SeqCst) {
            self.host.set_skip_mode(false);
            self.enter_paused_with(StopReason::Goto, Vec::new(), None);
        }

        if let Some(reason) = self.stop_reason_for(node) {
            if reason.0 == StopReason::Breakpoint {
                self.cleanup_temp_breakpoint();
            }
            self.enter_paused(reason, node);
        }

        let mut pending = self.pending_control.lock();
        std::mem::replace(&mut *pending, StatementControl::Continue)
    }

    fn update_current_label(&self, node: &StatementNode) {
        if let StatementKind::Label { name } = &node.kind {
            *self.current_label.write() = Some(name.clone());
        }
    }

    /// Update the tracked show/scene map. A `scene` statement clears every
    /// other entry on its layer before recording its own; `hide screen`
    /// removes its entry outright.
    fn track_show_statement(&self, node: &StatementNode) {
        match &node.kind {
            StatementKind::Show { imspec, is_scene } => {
                let mut tracker = self.show_tracker.write();
                if *is_scene {
                    tracker.retain(|(layer, _), _| layer != &imspec.layer);
                }
                tracker.insert(
                    (imspec.layer.clone(), imspec.tag.clone()),
                    ShowProvenance {
                        file: node.filename.clone(),
                        line: node.line,
                        statement_type: Some(if *is_scene { "scene" } else { "show" }),
                    },
                );
            }
            StatementKind::ShowScreen { screen_name } => {
                self.show_tracker.write().insert(
                    ("screens".to_string(), format!("screen:{screen_name}")),
                    ShowProvenance {
                        file: node.filename.clone(),
                        line: node.line,
                        statement_type: None,
                    },
                );
            }
            StatementKind::HideScreen { screen_name } => {
                self.show_tracker
                    .write()
                    .remove(&("screens".to_string(), format!("screen:{screen_name}")));
            }
            _ => {}
        }
    }

    /// The tracked show/scene provenance for (`layer`, `tag`), if any.
    #[must_use]
    pub fn show_statement(&self, layer: &str, tag: &str) -> Option<ShowProvenance> {
        self.show_tracker.read().get(&(layer.to_string(), tag.to_string())).cloned()
    }

    /// The tracked provenance for a displayed screen named `name`.
    #[must_use]
    pub fn screen_show_statement(&self, name: &str) -> Option<ShowProvenance> {
        self.show_tracker
            .read()
            .get(&("screens".to_string(), format!("screen:{name}")))
            .cloned()
    }

    /// The current (file, line) the script thread last reported, for
    /// `getSceneState`'s `current_line` and stack-trace fallbacks.
    #[must_use]
    pub fn current_location(&self) -> Option<(String, u32)> {
        self.current_location.read().clone()
    }

    /// Exception type names never reported even when a filter would
    /// otherwise match: iteration sentinels, generator-exit, and
    /// keyboard-interrupt-alikes are the host's own control-flow exceptions,
    /// not script errors.
    const EXCEPTION_DENYLIST: &'static [&'static str] = &["StopIteration", "GeneratorExit", "KeyboardInterrupt"];

    fn check_reraised_exception(&self) {
        let Some(exception) = self.host.last_exception() else {
            return;
        };
        if Self::EXCEPTION_DENYLIST.contains(&exception.type_name.as_str()) {
            return;
        }
        let signature = format!("{}:{}", exception.qualified_type_name, exception.message);
        let mut last = self.last_exception_signature.write();
        if last.as_deref() == Some(signature.as_str()) {
            return;
        }
        *last = Some(signature);
        let filters = self.exception_filters.read();
        if filters.raised || filters.uncaught {
            drop(filters);
            self.enter_paused_with(
                StopReason::Exception,
                Vec::new(),
                Some(format!("{}: {}", exception.type_name, exception.message)),
            );
        }
    }

    fn stop_reason_for(&self, node: &StatementNode) -> Option<(StopReason, Vec<u32>)> {
        if self.pause_requested.swap(false, Ordering::SeqCst) {
            return Some((StopReason::Pause, Vec::new()));
        }

        if let StatementKind::Label { name } = &node.kind {
            if let Some(fbp) = self.breakpoints.write().record_function_hit(name) {
                if self.condition_satisfied(fbp.condition.as_deref()) {
                    return Some((StopReason::FunctionBreakpoint, Vec::new()));
                }
            }
        }

        if let Some(bp) = self.breakpoints.write().record_hit(&node.filename, node.line) {
            if bp.is_logpoint() {
                self.emit_logpoint(&bp.log_message.unwrap_or_default(), &node.filename, node.line);
            } else if bp.hit_condition_satisfied() && self.condition_satisfied(bp.condition.as_deref()) {
                return Some((StopReason::Breakpoint, vec![bp.id]));
            }
        }

        let depth = self.host_context_depth(&self.host.current_context());
        let stop_for_step = match *self.step_mode.lock() {
            StepMode::None => false,
            StepMode::StepIn => true,
            StepMode::Next { stmt_depth, .. } => depth <= stmt_depth,
            StepMode::StepOut { stmt_depth, .. } => depth < stmt_depth,
        };
        if stop_for_step {
            return Some((StopReason::Step, Vec::new()));
        }

        None
    }

    /// Install the expression-level trace the first time it's actually
    /// needed (a breakpoint exists or a step is in progress), from the
    /// script thread, as `install_expression_trace` requires.
    fn maybe_install_trace(&self) {
        if self.trace_installed.load(Ordering::SeqCst) {
            return;
        }
        let stepping = !matches!(*self.step_mode.lock(), StepMode::None);
        if !stepping && !self.breakpoints.read().has_any() {
            return;
        }
        if self.trace_installed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(weak) = self.weak_self.lock().clone() else {
            return;
        };
        self.host.install_expression_trace(Arc::new(move |event| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.on_trace_event(event);
            }
        }));
    }

    /// Handle one event from the expression-level trace: track call depth
    /// for `Call`/`Return`, and apply the same breakpoint/stepping checks
    /// `stop_reason_for` applies at statement boundaries for `Line`, using
    /// the expression frame's own (file, line) and depth (spec.md §4.D).
    fn on_trace_event(&self, event: TraceEvent) {
        match event {
            TraceEvent::Call => {
                self.expr_depth.fetch_add(1, Ordering::SeqCst);
            }
            TraceEvent::Return => {
                let previous = self
                    .expr_depth
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| Some(d.saturating_sub(1)));
                let depth = previous.unwrap_or(0).saturating_sub(1);
                if self.should_stop_for_expr_return(depth) {
                    self.enter_paused_with(StopReason::Step, Vec::new(), None);
                }
            }
            TraceEvent::Line { file, line } => {
                if let Some((reason, hit_ids)) = self.stop_reason_for_trace_line(&file, line) {
                    if reason == StopReason::Breakpoint {
                        self.cleanup_temp_breakpoint();
                    }
                    self.enter_paused_with(reason, hit_ids, None);
                }
            }
        }
    }

    /// Whether an in-progress `stepOut` should fire now that the
    /// expression-level call depth has dropped to `depth` on a `Return`
    /// event.
    fn should_stop_for_expr_return(&self, depth: usize) -> bool {
        matches!(*self.step_mode.lock(), StepMode::StepOut { expr_depth: start, .. } if depth < start)
    }

    fn stop_reason_for_trace_line(&self, file: &str, line: u32) -> Option<(StopReason, Vec<u32>)> {
        if let Some(bp) = self.breakpoints.write().record_hit(file, line) {
            if bp.is_logpoint() {
                self.emit_logpoint(&bp.log_message.unwrap_or_default(), file, line);
            } else if bp.hit_condition_satisfied() && self.condition_satisfied(bp.condition.as_deref()) {
                return Some((StopReason::Breakpoint, vec![bp.id]));
            }
        }

        let depth = self.expr_depth.load(Ordering::SeqCst);
        let stop_for_step = match *self.step_mode.lock() {
            StepMode::None => false,
            StepMode::StepIn => true,
            StepMode::Next { expr_depth: start, .. } => depth <= start,
            StepMode::StepOut { expr_depth: start, .. } => depth < start,
        };
        stop_for_step.then_some((StopReason::Step, Vec::new()))
    }

    fn condition_satisfied(&self, condition: Option<&str>) -> bool {
        let Some(expr) = condition else {
            return true;
        };
        match futures::executor::block_on(self.host.eval(expr, EvalContext::Watch)) {
            EvalOutcome::Value(value) => value.is_truthy(),
            EvalOutcome::Ok => true,
            EvalOutcome::Error(_) | EvalOutcome::SyntaxError(_) => false,
        }
    }

    fn emit_logpoint(&self, template: &str, file: &str, line: u32) {
        let rendered = render_log_message(template, |expr| {
            match futures::executor::block_on(self.host.eval(expr, EvalContext::Watch)) {
                EvalOutcome::Value(value) => display_log_value(&value),
                EvalOutcome::Ok => String::new(),
                EvalOutcome::Error(message) | EvalOutcome::SyntaxError(message) => format!("<{expr}: {message}>"),
            }
        });
        let text = format!("[Logpoint] {rendered}\n");
        let _ = self.events_tx.send(DebugEvent::Output {
            category: "console".to_string(),
            text,
            file: Some(file.to_string()),
            line: Some(line),
        });
    }

    fn enter_paused(&self, (reason, hit_ids): (StopReason, Vec<u32>), _node: &StatementNode) {
        self.enter_paused_with(reason, hit_ids, None);
    }

    fn enter_paused_with(&self, reason: StopReason, hit_breakpoint_ids: Vec<u32>, description: Option<String>) {
        self.paused.store(true, Ordering::SeqCst);
        *self.debugger_state.write() = DebuggerState::Paused;
        let _ = self.events_tx.send(DebugEvent::Stopped { reason, hit_breakpoint_ids, description });
        futures::executor::block_on(self.resume_notify.notified());
    }

    fn on_reload(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            self.resume_notify.notify_one();
            *self.debugger_state.write() = DebuggerState::Running;
            let _ = self.events_tx.send(DebugEvent::Continued);
        }
        self.breakpoints.write().invalidate_path_cache();
        *self.current_location.write() = None;
        self.show_tracker.write().clear();
        let _ = self.events_tx.send(DebugEvent::Reloaded);
    }

    /// Current coarse lifecycle state, for logging around transitions.
    #[must_use]
    pub fn debugger_state(&self) -> DebuggerState {
        *self.debugger_state.read()
    }

    /// `initialize` completed; tell the dispatcher's event stream to forward
    /// the `initialized` event once the response itself has gone out.
    pub fn emit_initialized(&self) {
        let _ = self.events_tx.send(DebugEvent::Initialized);
    }

    /// `disconnect`: detach without asking the host to quit. Wakes any
    /// paused statement callback so the script thread doesn't block forever
    /// with no client left to resume it, and reports the session as torn
    /// down.
    pub async fn disconnect(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            self.resume_notify.notify_one();
        }
        *self.debugger_state.write() = DebuggerState::Disconnected;
        if self.trace_installed.swap(false, Ordering::SeqCst) {
            self.host.uninstall_expression_trace();
        }
        self.expr_depth.store(0, Ordering::SeqCst);
        let _ = self.events_tx.send(DebugEvent::Terminated);
    }

    /// `terminate`: like `disconnect`, but additionally asks the host itself
    /// to quit.
    pub async fn terminate(&self) {
        self.disconnect().await;
        self.host.request_quit();
    }

    /// Game base directory, for handlers building absolute paths.
    #[must_use]
    pub fn game_base(&self) -> &std::path::Path {
        &self.game_base
    }

    /// Configured script source extension (e.g. `.rpy`).
    #[must_use]
    pub fn script_ext(&self) -> &str {
        &self.script_ext
    }

    /// The label execution last entered, if any (used for `getSceneState`'s
    /// `currentLabel` and stack-trace fallbacks).
    #[must_use]
    pub fn current_label(&self) -> Option<String> {
        self.current_label.read().clone()
    }

    /// Snapshot everything a `stackTrace` request needs.
    #[must_use]
    pub fn snapshot(&self) -> HostContext {
        self.host.current_context()
    }
}

fn render_log_message(template: &str, mut eval: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open + 1..];
        let Some(close) = rest.find('}') else {
            out.push('{');
            out.push_str(rest);
            return out;
        };
        let expr = &rest[..close];
        out.push_str(&eval(expr));
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

fn display_log_value(value: &TypedValue) -> String {
    match &value.shape {
        crate::value::ValueShape::Str(s) => s.clone(),
        crate::value::ValueShape::Int(i) => i.to_string(),
        crate::value::ValueShape::Float(f) => f.to_string(),
        crate::value::ValueShape::Bool(b) => b.to_string(),
        crate::value::ValueShape::None => "None".to_string(),
        _ => format!("<{}>", value.type_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_log_message_substitutes_braced_expressions() {
        let out = render_log_message("health={health}, name={name}", |expr| format!("[{expr}]"));
        assert_eq!(out, "health=[health], name=[name]");
    }

    #[test]
    fn render_log_message_passes_through_plain_text() {
        let out = render_log_message("no placeholders here", |_| "unused".to_string());
        assert_eq!(out, "no placeholders here");
    }

    #[test]
    fn render_log_message_tolerates_unclosed_brace() {
        let out = render_log_message("broken {oops", |expr| expr.to_string());
        assert_eq!(out, "broken {oops");
    }

    #[test]
    fn display_log_value_renders_scalars_without_quoting() {
        let value = TypedValue {
            type_name: "str".to_string(),
            shape: crate::value::ValueShape::Str("hi".to_string()),
        };
        assert_eq!(display_log_value(&value), "hi");
    }

    use crate::host::{
        AudioState, EvalContext, EvalOutcome, ExceptionInfo, HostContext, ImageSpec, LabelSite,
    };
    use async_trait::async_trait;

    /// A host with no script behind it, for testing coordinator bookkeeping
    /// that never needs to actually evaluate or block.
    #[derive(Default)]
    struct NullHost(HashMap<String, LabelSite>);

    impl NullHost {
        fn with_labels(labels: HashMap<String, LabelSite>) -> Self {
            Self(labels)
        }
    }

    #[async_trait]
    impl ScriptHost for NullHost {
        fn label_map(&self) -> HashMap<String, LabelSite> {
            self.0.clone()
        }

        fn current_context(&self) -> HostContext {
            HostContext {
                current_statement: None,
                return_stack: Vec::new(),
                expression_frames: Vec::new(),
                scene_lists: HashMap::new(),
                screens: Vec::new(),
                audio: AudioState::default(),
                current_speaker: None,
            }
        }

        fn rollback_supported(&self) -> bool {
            false
        }

        async fn rollback_one_checkpoint(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn set_skip_mode(&self, _enabled: bool) {}
        fn post_tick(&self) {}

        async fn eval(&self, _expr: &str, _context: EvalContext) -> EvalOutcome {
            EvalOutcome::Ok
        }

        async fn exec(&self, _stmt: &str) -> EvalOutcome {
            EvalOutcome::Ok
        }

        async fn locals(&self) -> Vec<(String, TypedValue)> {
            Vec::new()
        }

        async fn store_variables(&self) -> Vec<(String, TypedValue)> {
            Vec::new()
        }

        async fn global_variables(&self) -> Vec<(String, TypedValue)> {
            Vec::new()
        }

        async fn set_local(&self, _name: &str, _value_expr: &str) -> EvalOutcome {
            EvalOutcome::Ok
        }

        async fn set_global(&self, _name: &str, _value_expr: &str) -> EvalOutcome {
            EvalOutcome::Ok
        }

        async fn invoke_on_script_thread(
            &self,
            f: Box<dyn FnOnce() + Send>,
            _timeout: std::time::Duration,
        ) -> anyhow::Result<()> {
            f();
            Ok(())
        }

        fn on_reload(&self, _callback: Box<dyn Fn() + Send + Sync>) {}

        fn request_quit(&self) {}

        fn register_statement_callback(
            &self,
            _callback: Arc<dyn Fn(&StatementNode) -> StatementControl + Send + Sync>,
        ) {
        }

        fn last_exception(&self) -> Option<ExceptionInfo> {
            None
        }

        fn install_expression_trace(&self, _callback: Arc<dyn Fn(crate::host::TraceEvent) + Send + Sync>) {}
        fn uninstall_expression_trace(&self) {}
    }

    fn show_node(layer: &str, tag: &str, is_scene: bool) -> StatementNode {
        StatementNode {
            filename: "/g/s.rpy".to_string(),
            line: 42,
            kind: StatementKind::Show {
                imspec: ImageSpec {
                    tag: tag.to_string(),
                    layer: layer.to_string(),
                    attributes: Vec::new(),
                },
                is_scene,
            },
        }
    }

    #[test]
    fn scene_clears_prior_entries_on_the_same_layer() {
        let (coordinator, _rx) = Coordinator::new(Arc::new(NullHost::default()), PathBuf::from("/g"), ".rpy".to_string());
        coordinator.track_show_statement(&show_node("master", "bg", false));
        assert!(coordinator.show_statement("master", "bg").is_some());

        coordinator.track_show_statement(&show_node("master", "eileen", true));
        assert!(coordinator.show_statement("master", "bg").is_none());
        let provenance = coordinator.show_statement("master", "eileen").unwrap();
        assert_eq!(provenance.statement_type, Some("scene"));
        assert_eq!(provenance.line, 42);
    }

    #[test]
    fn hide_screen_removes_tracked_entry() {
        let (coordinator, _rx) = Coordinator::new(Arc::new(NullHost::default()), PathBuf::from("/g"), ".rpy".to_string());
        coordinator.track_show_statement(&StatementNode {
            filename: "/g/s.rpy".to_string(),
            line: 7,
            kind: StatementKind::ShowScreen { screen_name: "quick_menu".to_string() },
        });
        assert!(coordinator.screen_show_statement("quick_menu").is_some());

        coordinator.track_show_statement(&StatementNode {
            filename: "/g/s.rpy".to_string(),
            line: 8,
            kind: StatementKind::HideScreen { screen_name: "quick_menu".to_string() },
        });
        assert!(coordinator.screen_show_statement("quick_menu").is_none());
    }

    #[tokio::test]
    async fn run_to_line_tears_down_its_temp_breakpoint_once_hit() {
        let (coordinator, _rx) = Coordinator::new(Arc::new(NullHost::default()), PathBuf::from("/g"), ".rpy".to_string());
        coordinator.run_to_line("/g/s.rpy", 42).await;
        assert_eq!(coordinator.breakpoints().write().file_count(), 1);

        let node = StatementNode {
            filename: "/g/s.rpy".to_string(),
            line: 42,
            kind: StatementKind::Other { kind: "other".to_string() },
        };
        let reason = coordinator.stop_reason_for(&node).expect("temp breakpoint should hit");
        assert_eq!(reason.0, StopReason::Breakpoint);
        coordinator.cleanup_temp_breakpoint();

        assert_eq!(coordinator.breakpoints().write().file_count(), 0);
        assert!(coordinator.run_to_line_target.lock().is_none());
    }

    #[tokio::test]
    async fn run_to_line_jumps_when_the_target_is_in_a_different_label() {
        let mut labels = HashMap::new();
        labels.insert("start".to_string(), LabelSite { file: "/g/s.rpy".to_string(), line: 1 });
        labels.insert("chapter2".to_string(), LabelSite { file: "/g/s.rpy".to_string(), line: 40 });
        let (coordinator, _rx) = Coordinator::new(Arc::new(NullHost::with_labels(labels)), PathBuf::from("/g"), ".rpy".to_string());

        *coordinator.current_label.write() = Some("start".to_string());
        coordinator.run_to_line("/g/s.rpy", 50).await;

        assert_eq!(
            *coordinator.pending_control.lock(),
            StatementControl::JumpTo("chapter2".to_string())
        );
        assert_eq!(coordinator.breakpoints().write().file_count(), 1);
    }

    #[tokio::test]
    async fn run_to_line_does_not_jump_within_the_same_label() {
        let mut labels = HashMap::new();
        labels.insert("start".to_string(), LabelSite { file: "/g/s.rpy".to_string(), line: 1 });
        let (coordinator, _rx) = Coordinator::new(Arc::new(NullHost::with_labels(labels)), PathBuf::from("/g"), ".rpy".to_string());

        *coordinator.current_label.write() = Some("start".to_string());
        coordinator.run_to_line("/g/s.rpy", 10).await;

        assert_eq!(*coordinator.pending_control.lock(), StatementControl::Continue);
    }

    #[tokio::test]
    async fn maybe_install_trace_installs_once_a_breakpoint_exists() {
        let host = Arc::new(RecordingTraceHost::default());
        let (coordinator, _rx) = Coordinator::new(host.clone(), PathBuf::from("/g"), ".rpy".to_string());
        assert!(!host.installed.load(Ordering::SeqCst));

        coordinator.breakpoints().write().set_breakpoints(
            "/g/s.rpy",
            vec![BreakpointSpec { line: 99, ..Default::default() }],
        );
        let node = StatementNode {
            filename: "/g/s.rpy".to_string(),
            line: 1,
            kind: StatementKind::Other { kind: "other".to_string() },
        };
        coordinator.on_statement(&node);

        assert!(host.installed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn maybe_install_trace_does_nothing_with_no_breakpoints_or_step_in_progress() {
        let host = Arc::new(RecordingTraceHost::default());
        let (coordinator, _rx) = Coordinator::new(host.clone(), PathBuf::from("/g"), ".rpy".to_string());
        let node = StatementNode {
            filename: "/g/s.rpy".to_string(),
            line: 1,
            kind: StatementKind::Other { kind: "other".to_string() },
        };
        coordinator.on_statement(&node);

        assert!(!host.installed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn expr_call_and_return_track_depth_independent_of_statement_depth() {
        let (coordinator, _rx) = Coordinator::new(Arc::new(NullHost::default()), PathBuf::from("/g"), ".rpy".to_string());
        coordinator.on_trace_event(TraceEvent::Call);
        assert_eq!(coordinator.expr_depth.load(Ordering::SeqCst), 1);

        coordinator.step_out().await;
        assert!(!coordinator.should_stop_for_expr_return(1));
        assert!(coordinator.should_stop_for_expr_return(0));
    }

    #[tokio::test]
    async fn step_out_does_not_fire_on_expr_return_outside_step_out_mode() {
        let (coordinator, _rx) = Coordinator::new(Arc::new(NullHost::default()), PathBuf::from("/g"), ".rpy".to_string());
        coordinator.on_trace_event(TraceEvent::Call);
        assert!(!coordinator.should_stop_for_expr_return(0));
    }

    #[tokio::test]
    async fn stop_reason_for_trace_line_matches_a_breakpoint_on_an_expression_line() {
        let (coordinator, _rx) = Coordinator::new(Arc::new(NullHost::default()), PathBuf::from("/g"), ".rpy".to_string());
        coordinator.breakpoints().write().set_breakpoints(
            "/g/s.rpy",
            vec![BreakpointSpec { line: 7, ..Default::default() }],
        );

        let reason = coordinator.stop_reason_for_trace_line("/g/s.rpy", 7).expect("breakpoint should match");
        assert_eq!(reason.0, StopReason::Breakpoint);
    }

    /// A host whose `install_expression_trace` just flags that it was
    /// called, without actually retaining or invoking the callback.
    #[derive(Default)]
    struct RecordingTraceHost {
        installed: AtomicBool,
    }

    #[async_trait]
    impl ScriptHost for RecordingTraceHost {
        fn label_map(&self) -> HashMap<String, LabelSite> {
            HashMap::new()
        }

        fn current_context(&self) -> HostContext {
            HostContext {
                current_statement: None,
                return_stack: Vec::new(),
                expression_frames: Vec::new(),
                scene_lists: HashMap::new(),
                screens: Vec::new(),
                audio: AudioState::default(),
                current_speaker: None,
            }
        }

        fn rollback_supported(&self) -> bool {
            false
        }

        async fn rollback_one_checkpoint(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn set_skip_mode(&self, _enabled: bool) {}
        fn post_tick(&self) {}

        async fn eval(&self, _expr: &str, _context: EvalContext) -> EvalOutcome {
            EvalOutcome::Ok
        }

        async fn exec(&self, _stmt: &str) -> EvalOutcome {
            EvalOutcome::Ok
        }

        async fn locals(&self) -> Vec<(String, TypedValue)> {
            Vec::new()
        }

        async fn store_variables(&self) -> Vec<(String, TypedValue)> {
            Vec::new()
        }

        async fn global_variables(&self) -> Vec<(String, TypedValue)> {
            Vec::new()
        }

        async fn set_local(&self, _name: &str, _value_expr: &str) -> EvalOutcome {
            EvalOutcome::Ok
        }

        async fn set_global(&self, _name: &str, _value_expr: &str) -> EvalOutcome {
            EvalOutcome::Ok
        }

        async fn invoke_on_script_thread(
            &self,
            f: Box<dyn FnOnce() + Send>,
            _timeout: std::time::Duration,
        ) -> anyhow::Result<()> {
            f();
            Ok(())
        }

        fn on_reload(&self, _callback: Box<dyn Fn() + Send + Sync>) {}

        fn request_quit(&self) {}

        fn register_statement_callback(
            &self,
            _callback: Arc<dyn Fn(&StatementNode) -> StatementControl + Send + Sync>,
        ) {
        }

        fn last_exception(&self) -> Option<ExceptionInfo> {
            None
        }

        fn install_expression_trace(&self, _callback: Arc<dyn Fn(TraceEvent) + Send + Sync>) {
            self.installed.store(true, Ordering::SeqCst);
        }

        fn uninstall_expression_trace(&self) {
            self.installed.store(false, Ordering::SeqCst);
        }
    }
}
