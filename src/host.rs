//! The collaborator boundary: everything the script/expression interpreters
//! must expose to this engine. Nothing in this module executes a script
//! statement or expression itself — it only describes the shape the host
//! hands over.

use crate::value::TypedValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Where a label is defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSite {
    /// Absolute or game-relative source file.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
}

/// One node of the host's script language, as handed to the statement callback.
///
/// `filename`/`line` are present on every node; `kind` carries the
/// attributes specific to the node's statement type.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementNode {
    /// Source file containing the statement.
    pub filename: String,
    /// 1-based line number.
    pub line: u32,
    /// Statement-specific payload.
    pub kind: StatementKind,
}

/// Statement-specific payload for a [`StatementNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `"..." ` dialogue; `what` is the (possibly truncated for display) text.
    Say {
        /// The dialogue text.
        what: String,
    },
    /// `jump target`.
    Jump {
        /// Target label name.
        target: String,
    },
    /// `call target`.
    Call {
        /// Target label name.
        target: String,
    },
    /// `return`.
    Return,
    /// `label name:`.
    Label {
        /// Label name.
        name: String,
    },
    /// `show ...` or `scene ...`.
    Show {
        /// Layer, tag, and attribute spec for the shown image.
        imspec: ImageSpec,
        /// `true` for `scene` (clears the layer first), `false` for `show`.
        is_scene: bool,
    },
    /// `hide tag`.
    Hide {
        /// Image tag being hidden.
        tag: String,
        /// Layer the tag was shown on.
        layer: String,
    },
    /// `show screen name(...)`.
    ShowScreen {
        /// Screen name.
        screen_name: String,
    },
    /// `hide screen name`.
    HideScreen {
        /// Screen name.
        screen_name: String,
    },
    /// `if`/`menu`/user-defined statement/anything not broken out above.
    Other {
        /// Lowercased node-kind name, used as the default stack-frame label.
        kind: String,
    },
}

/// A layer/tag/attribute spec as carried by show/scene nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    /// Image tag.
    pub tag: String,
    /// Scene layer (`master`, `screens`, `overlay`, …).
    pub layer: String,
    /// Attributes applied (e.g. `["happy"]`).
    pub attributes: Vec<String>,
}

/// A host-side displayable, walked recursively to find a backing file.
///
/// Hosts that duck-type through `filename`/`target`/`child`/`image`
/// attributes at runtime should implement this trait to make that walk
/// explicit instead of reflective.
pub trait Displayable: Send + Sync {
    /// Runtime type name, for display purposes.
    fn type_name(&self) -> &str;
    /// Backing file, if this displayable wraps one directly.
    fn filename(&self) -> Option<&str>;
    /// Nested displayables to probe if `filename` is `None` (wrappers,
    /// references, composites).
    fn nested(&self) -> Vec<Arc<dyn Displayable>> {
        Vec::new()
    }
}

/// One sub-layer of a [`LayeredImage`].
#[derive(Clone)]
pub enum LayeredLayer {
    /// Always active.
    Always {
        /// The layer's displayable, if any.
        image: Option<Arc<dyn Displayable>>,
    },
    /// Active iff `attribute` is in the currently applied attribute set.
    Attribute {
        /// The attribute name gating this layer.
        attribute: String,
        /// The group this attribute belongs to, if any.
        group: Option<String>,
        /// The layer's displayable, if any.
        image: Option<Arc<dyn Displayable>>,
    },
    /// A single conditional layer; evaluation is not modeled.
    Condition,
    /// A group of conditional layers; evaluation is not modeled.
    ConditionGroup,
}

/// Declares one attribute a [`LayeredImage`] knows about, for default-attribute
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    /// Attribute name.
    pub attribute: String,
    /// Whether this attribute is applied by default.
    pub default: bool,
}

/// A composite image made of attribute-selected sub-layers.
pub trait LayeredImage: Send + Sync {
    /// The sub-layers, in declaration order.
    fn layers(&self) -> Vec<LayeredLayer>;
    /// Declared attributes, for default-attribute resolution.
    fn attributes(&self) -> Vec<AttributeDecl>;
    /// Attributes banned (mutually exclusive) given the currently-applied set.
    fn banned(&self, applied: &std::collections::HashSet<String>) -> std::collections::HashSet<String>;
}

/// Either a plain displayable or a layered image, as tracked per (layer, tag).
pub enum ShownImage {
    /// A non-composite image.
    Plain(Arc<dyn Displayable>),
    /// A composite, attribute-selected image.
    Layered(Arc<dyn LayeredImage>),
}

/// One entry in a per-layer scene list.
pub struct SceneEntry {
    /// Image tag.
    pub tag: String,
    /// The displayable currently bound to the tag.
    pub displayable: ShownImage,
    /// Transforms applied via `at`.
    pub at_list: Vec<String>,
    /// Attributes currently applied to the tag (drives layered-image
    /// component selection and is echoed in `getSceneState`).
    pub attributes: Vec<String>,
}

/// A displayed screen (tracked separately from image layers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenEntry {
    /// Screen name.
    pub name: String,
    /// Layer the screen is displayed on.
    pub layer: String,
}

/// Currently playing audio, one slot per channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioState {
    /// `music` channel filename, if playing.
    pub music: Option<String>,
    /// `sound` channel filename, if playing.
    pub sound: Option<String>,
    /// `voice` channel filename, if playing.
    pub voice: Option<String>,
}

/// One frame of the host's general-purpose expression interpreter, nested
/// inside the current statement's execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprFrame {
    /// Display name (function/closure name, or `"<anonymous>"`).
    pub name: String,
    /// Source file this frame is executing in.
    pub file: String,
    /// Current line within `file`.
    pub line: u32,
}

/// A snapshot of the host's current execution context.
pub struct HostContext {
    /// The statement about to execute, if any.
    pub current_statement: Option<StatementNode>,
    /// Labels on the logical call-return stack, outermost last.
    pub return_stack: Vec<String>,
    /// Expression-interpreter frames above the current statement, innermost
    /// first.
    pub expression_frames: Vec<ExprFrame>,
    /// Per-layer ordered scene lists.
    pub scene_lists: HashMap<String, Vec<SceneEntry>>,
    /// Screens currently displayed, across `screens` and overlay layers.
    pub screens: Vec<ScreenEntry>,
    /// Currently playing audio.
    pub audio: AudioState,
    /// The name of whoever is currently speaking, if any.
    pub current_speaker: Option<String>,
}

/// The context an expression is evaluated or executed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalContext {
    /// A watch expression, re-evaluated each pause.
    Watch,
    /// A hover tooltip; failures are swallowed.
    Hover,
    /// A REPL-style `evaluate` request.
    Repl,
}

/// The outcome of an `eval`/`exec` call against the script's expression
/// interpreter.
pub enum EvalOutcome {
    /// Evaluation/execution succeeded with this value.
    Value(TypedValue),
    /// Execution succeeded with no meaningful result (e.g. a bare statement).
    Ok,
    /// Evaluation/execution raised.
    Error(String),
    /// `eval` couldn't parse `expr` as an expression at all (as opposed to
    /// parsing fine and raising at runtime). `evaluate`'s `repl` context
    /// uses this to fall back to `exec`, the way a debug console accepts
    /// both expressions and bare statements.
    SyntaxError(String),
}

/// Details of the most recently caught exception, for `exceptionInfo`.
#[derive(Debug, Clone)]
pub struct ExceptionInfo {
    /// Short exception message.
    pub message: String,
    /// Exception type name.
    pub type_name: String,
    /// Fully qualified type name (module + type).
    pub qualified_type_name: String,
    /// Formatted traceback text.
    pub traceback: String,
}

/// Everything the script/expression interpreters must expose for this engine
/// to drive a debug session.
#[async_trait]
pub trait ScriptHost: Send + Sync {
    /// Name → definition site, for goto targets and function breakpoints.
    fn label_map(&self) -> HashMap<String, LabelSite>;

    /// The host's current execution context.
    fn current_context(&self) -> HostContext;

    /// Whether rollback (reverse execution) is available at all.
    fn rollback_supported(&self) -> bool;

    /// Roll the host back by exactly one checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the host has no prior checkpoint or rollback fails.
    async fn rollback_one_checkpoint(&self) -> anyhow::Result<()>;

    /// Enable or disable skip (fast-forward) mode.
    fn set_skip_mode(&self, enabled: bool);

    /// Request a zero-delay wake-up so the next statement callback fires
    /// promptly instead of waiting on user-driven pacing.
    fn post_tick(&self);

    /// Evaluate `expr` in the script's named-variable store.
    async fn eval(&self, expr: &str, context: EvalContext) -> EvalOutcome;

    /// Execute `stmt` (assignment or statement) in the script's store.
    async fn exec(&self, stmt: &str) -> EvalOutcome;

    /// Local variables of the innermost expression frame, if any is
    /// executing (empty when execution is at statement level).
    async fn locals(&self) -> Vec<(String, TypedValue)>;

    /// Top-level names in the script's persistent store.
    async fn store_variables(&self) -> Vec<(String, TypedValue)>;

    /// Names in the host's global/builtin namespace.
    async fn global_variables(&self) -> Vec<(String, TypedValue)>;

    /// Assign `value_expr` to `name` in the innermost expression frame's
    /// locals.
    async fn set_local(&self, name: &str, value_expr: &str) -> EvalOutcome;

    /// Assign `value_expr` to `name` in the host's global namespace.
    async fn set_global(&self, name: &str, value_expr: &str) -> EvalOutcome;

    /// Run `f` on the script thread, waiting up to `timeout` for it to
    /// complete. Used for operations (scene queries, screenshots) that must
    /// run where the interpreter itself runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the script thread does not respond within `timeout`.
    async fn invoke_on_script_thread(
        &self,
        f: Box<dyn FnOnce() + Send>,
        timeout: std::time::Duration,
    ) -> anyhow::Result<()>;

    /// Subscribe to script-reload notifications. The callback is invoked
    /// once per reload.
    fn on_reload(&self, callback: Box<dyn Fn() + Send + Sync>);

    /// `terminate` additionally asks the host to quit, beyond the plain
    /// `disconnect` detach every collaborator gets for free.
    fn request_quit(&self);

    /// Register the statement-boundary callback. The host invokes it
    /// immediately before executing each statement; `true` continuation means
    /// proceed, `StatementControl::Jump` asks the host to raise its own
    /// jump-to-label control transfer.
    fn register_statement_callback(&self, callback: Arc<dyn Fn(&StatementNode) -> StatementControl + Send + Sync>);

    /// The most recent uncaught/raised exception the host observed, if any
    /// (supports `exceptionInfo`).
    fn last_exception(&self) -> Option<ExceptionInfo>;

    /// Install the expression-level line/call/return trace. Called at most
    /// once per session, from the script thread (inside the statement
    /// callback), the first time a breakpoint exists or a step is in
    /// progress — never unconditionally, since the trace fires on every
    /// expression line. The host is responsible for excluding its own
    /// internals and anything not ending in the configured script
    /// extension before forwarding an event.
    fn install_expression_trace(&self, callback: Arc<dyn Fn(TraceEvent) + Send + Sync>);

    /// Remove whatever trace `install_expression_trace` installed, if any.
    /// Called on detach so a later session starts without a stale hook.
    fn uninstall_expression_trace(&self);
}

/// One event from the host's expression-level line/call/return trace
/// (spec.md §4.D "Expression-level trace").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// Execution reached a new line within an expression frame.
    Line {
        /// Source file the expression frame is executing in.
        file: String,
        /// Current line within `file`.
        line: u32,
    },
    /// An expression-level call was entered; increments call depth.
    Call,
    /// An expression-level call returned; decrements call depth.
    Return,
}

/// What the statement callback asks the host to do next, realizing
/// jump-exception semantics without a caught/thrown cycle across the
/// coordinator's own code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementControl {
    /// Proceed normally.
    Continue,
    /// Raise the host's own control transfer to jump to this label.
    JumpTo(String),
}
