//! Protocol dispatcher: routes a parsed inbound request to the coordinator
//! and its collaborators, and wraps the outcome into a DAP `Response`.
//!
//! A single `handle_request` matches on `command`, with one `handle_*`
//! method per command, and a shared `next_seq` atomic counter the server
//! module also draws from when it turns coordinator events into DAP `event`
//! messages.

use crate::coordinator::Coordinator;
use crate::error::DapError;
use crate::frames::{build_stack, resolve_path};
use crate::host::{EvalContext, EvalOutcome};
use crate::navigator::{goto_targets, label_exists, resolve_goto_target};
use crate::protocol::{Capabilities, InboundMessage, Response};
use crate::scene::{get_image_definition, scene_state};
use crate::variables::{format_value, VariableInspector};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

fn parse_args<T: DeserializeOwned>(value: &Value) -> Result<T, DapError> {
    serde_json::from_value(value.clone()).map_err(|e| DapError::client_protocol(e.to_string()))
}

/// Routes inbound DAP requests to the coordinator and its collaborators.
pub struct Dispatcher {
    coordinator: Arc<Coordinator>,
    next_seq: AtomicI64,
}

impl Dispatcher {
    /// Build a dispatcher over `coordinator`.
    #[must_use]
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            next_seq: AtomicI64::new(1),
        }
    }

    /// Next server-assigned sequence number; shared between responses and
    /// the coordinator-event-driven `event` messages the server module emits.
    pub fn next_seq(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Handle one inbound request end to end, producing its response.
    pub async fn handle(&self, msg: InboundMessage) -> Response {
        let command = msg.command.clone();
        let request_seq = msg.seq;
        match self.dispatch(&msg).await {
            Ok(body) => Response::success(self.next_seq(), request_seq, command, body),
            Err(err) => Response::failure(self.next_seq(), request_seq, command, err.to_message()),
        }
    }

    async fn dispatch(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        match msg.command.as_str() {
            "initialize" => self.handle_initialize(),
            "launch" | "attach" | "configurationDone" => Ok(None),
            "setBreakpoints" => self.handle_set_breakpoints(msg),
            "setFunctionBreakpoints" => self.handle_set_function_breakpoints(msg),
            "setExceptionBreakpoints" => self.handle_set_exception_breakpoints(msg),
            "threads" => Ok(Some(json!({ "threads": [{ "id": 1, "name": "main" }] }))),
            "stackTrace" => self.handle_stack_trace(),
            "scopes" => self.handle_scopes(),
            "variables" => self.handle_variables(msg).await,
            "setVariable" => self.handle_set_variable(msg).await,
            "setExpression" => self.handle_set_expression(msg).await,
            "evaluate" => self.handle_evaluate(msg).await,
            "completions" => self.handle_completions(msg).await,
            "continue" => {
                self.coordinator.resume().await;
                Ok(Some(json!({ "allThreadsContinued": true })))
            }
            "pause" => {
                self.coordinator.request_pause();
                Ok(None)
            }
            "next" => {
                self.coordinator.step_next().await;
                Ok(None)
            }
            "stepIn" => {
                self.coordinator.step_in().await;
                Ok(None)
            }
            "stepOut" => {
                self.coordinator.step_out().await;
                Ok(None)
            }
            "stepBack" | "reverseContinue" => {
                self.coordinator
                    .step_back()
                    .await
                    .map_err(|e| DapError::unsupported(e.to_string()))?;
                Ok(None)
            }
            "gotoTargets" => self.handle_goto_targets(msg),
            "goto" => self.handle_goto(msg).await,
            "runToLine" => self.handle_run_to_line(msg).await,
            "jumpToLabel" => self.handle_jump_to_label(msg).await,
            "getSceneState" => self.handle_get_scene_state(),
            "getImageDefinition" => self.handle_get_image_definition(msg),
            "source" => self.handle_source(msg),
            "exceptionInfo" => self.handle_exception_info(),
            "disconnect" => {
                self.coordinator.disconnect().await;
                Ok(None)
            }
            "terminate" => {
                self.coordinator.terminate().await;
                Ok(None)
            }
            other => Err(DapError::unsupported(format!("unsupported command: {other}"))),
        }
    }

    fn handle_initialize(&self) -> Result<Option<Value>, DapError> {
        let capabilities = Capabilities::default();
        let body = serde_json::to_value(capabilities).map_err(|e| DapError::client_protocol(e.to_string()))?;
        self.coordinator.emit_initialized();
        Ok(Some(body))
    }

    fn handle_set_breakpoints(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: SetBreakpointsArguments = parse_args(&msg.arguments)?;
        let path = args
            .source
            .path
            .ok_or_else(|| DapError::client_protocol("setBreakpoints requires source.path"))?;
        let specs = args
            .breakpoints
            .into_iter()
            .map(|b| crate::breakpoints::BreakpointSpec {
                line: b.line,
                condition: b.condition,
                hit_condition: b.hit_condition,
                log_message: b.log_message,
            })
            .collect();
        let created = self.coordinator.breakpoints().write().set_breakpoints(&path, specs);
        let breakpoints: Vec<Value> = created
            .into_iter()
            .map(|bp| {
                json!({
                    "id": bp.id,
                    "verified": bp.verified,
                    "line": bp.line,
                    "source": { "path": bp.file.to_string_lossy() },
                })
            })
            .collect();
        Ok(Some(json!({ "breakpoints": breakpoints })))
    }

    fn handle_set_function_breakpoints(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: SetFunctionBreakpointsArguments = parse_args(&msg.arguments)?;
        let labels: HashSet<String> = self.coordinator.host().label_map().into_keys().collect();
        let specs = args.breakpoints.into_iter().map(|b| (b.name, b.condition)).collect();
        let result = self.coordinator.breakpoints().write().set_function_breakpoints(specs, &labels);
        let breakpoints: Vec<Value> = result
            .into_iter()
            .map(|(fbp, verified)| json!({ "id": fbp.id, "verified": verified }))
            .collect();
        Ok(Some(json!({ "breakpoints": breakpoints })))
    }

    fn handle_set_exception_breakpoints(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: SetExceptionBreakpointsArguments = parse_args(&msg.arguments)?;
        self.coordinator.set_exception_filters(&args.filters);
        let breakpoints: Vec<Value> = args.filters.iter().map(|_| json!({ "verified": true })).collect();
        Ok(Some(json!({ "breakpoints": breakpoints })))
    }

    fn handle_stack_trace(&self) -> Result<Option<Value>, DapError> {
        let context = self.coordinator.snapshot();
        let label_map = self.coordinator.host().label_map();
        let frames = build_stack(
            context.current_statement.as_ref(),
            &context.expression_frames,
            &context.return_stack,
            &label_map,
            self.coordinator.game_base(),
            self.coordinator.script_ext(),
        );
        let total = frames.len();
        let stack_frames: Vec<Value> = frames
            .into_iter()
            .map(|f| {
                json!({
                    "id": f.id,
                    "name": f.name,
                    "source": { "path": f.source_path.to_string_lossy(), "name": f.source_name },
                    "line": f.line,
                    "column": f.column,
                })
            })
            .collect();
        Ok(Some(json!({ "stackFrames": stack_frames, "totalFrames": total })))
    }

    fn handle_scopes(&self) -> Result<Option<Value>, DapError> {
        let context = self.coordinator.snapshot();
        let has_locals = !context.expression_frames.is_empty();
        let scopes: Vec<Value> = VariableInspector::scopes(has_locals)
            .into_iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "variablesReference": s.variables_reference,
                    "expensive": s.expensive,
                })
            })
            .collect();
        Ok(Some(json!({ "scopes": scopes })))
    }

    async fn handle_variables(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: VariablesArguments = parse_args(&msg.arguments)?;
        let mut inspector = self.coordinator.variables().lock().await;
        let rows = inspector.variables(self.coordinator.host().as_ref(), args.variables_reference).await;
        let variables: Vec<Value> = rows
            .into_iter()
            .map(|row| {
                json!({
                    "name": row.name,
                    "value": row.value,
                    "type": row.type_name,
                    "variablesReference": row.variables_reference,
                })
            })
            .collect();
        Ok(Some(json!({ "variables": variables })))
    }

    async fn handle_set_variable(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: SetVariableArguments = parse_args(&msg.arguments)?;
        let mut inspector = self.coordinator.variables().lock().await;
        let outcome = inspector
            .set_variable(self.coordinator.host().as_ref(), args.variables_reference, &args.name, &args.value)
            .await;
        Ok(Some(outcome_body(outcome, "value")?))
    }

    async fn handle_set_expression(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: SetExpressionArguments = parse_args(&msg.arguments)?;
        let outcome = VariableInspector::set_expression(self.coordinator.host().as_ref(), &args.expression, &args.value).await;
        Ok(Some(outcome_body(outcome, "value")?))
    }

    async fn handle_evaluate(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: EvaluateArguments = parse_args(&msg.arguments)?;
        let context = match args.context.as_deref() {
            Some("watch") => EvalContext::Watch,
            Some("hover") => EvalContext::Hover,
            _ => EvalContext::Repl,
        };
        let outcome = VariableInspector::evaluate(self.coordinator.host().as_ref(), &args.expression, context).await;
        Ok(Some(evaluate_body(outcome, context)))
    }

    async fn handle_completions(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: CompletionsArguments = parse_args(&msg.arguments)?;
        let targets = VariableInspector::completions(self.coordinator.host().as_ref(), &args.text, args.column).await;
        let targets: Vec<Value> = targets
            .into_iter()
            .map(|t| json!({ "label": t.label, "type": t.kind }))
            .collect();
        Ok(Some(json!({ "targets": targets })))
    }

    fn handle_goto_targets(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: GotoTargetsArguments = parse_args(&msg.arguments)?;
        let path = args
            .source
            .path
            .ok_or_else(|| DapError::client_protocol("gotoTargets requires source.path"))?;
        let label_map = self.coordinator.host().label_map();
        let targets = goto_targets(&path, &label_map, self.coordinator.game_base());
        let targets: Vec<Value> = targets
            .into_iter()
            .map(|t| {
                json!({
                    "id": t.id,
                    "label": t.label,
                    "line": t.line,
                    "instructionPointerReference": t.instruction_pointer_reference,
                })
            })
            .collect();
        Ok(Some(json!({ "targets": targets })))
    }

    async fn handle_goto(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: GotoArguments = parse_args(&msg.arguments)?;
        let label_map = self.coordinator.host().label_map();
        let label = resolve_goto_target(args.target_id, &label_map)
            .ok_or_else(|| DapError::client_protocol("unknown gotoTargets id"))?
            .to_string();
        self.coordinator.request_goto(label, true).await;
        Ok(None)
    }

    async fn handle_run_to_line(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: RunToLineArguments = parse_args(&msg.arguments)?;
        let path = args
            .source
            .path
            .ok_or_else(|| DapError::client_protocol("runToLine requires source.path"))?;
        self.coordinator.run_to_line(&path, args.line).await;
        Ok(None)
    }

    async fn handle_jump_to_label(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: JumpToLabelArguments = parse_args(&msg.arguments)?;
        let label_map = self.coordinator.host().label_map();
        if !label_exists(&args.label, &label_map) {
            return Err(DapError::client_protocol(format!("unknown label: {}", args.label)));
        }
        self.coordinator.request_goto(args.label, true).await;
        Ok(None)
    }

    fn handle_get_scene_state(&self) -> Result<Option<Value>, DapError> {
        let context = self.coordinator.snapshot();
        let current_label = self.coordinator.current_label();
        let current_line = self.coordinator.current_location().map(|(_, line)| line);
        let coordinator = Arc::clone(&self.coordinator);
        let tracked_image = {
            let coordinator = Arc::clone(&coordinator);
            move |layer: &str, tag: &str| coordinator.show_statement(layer, tag)
        };
        let tracked_screen = move |name: &str| coordinator.screen_show_statement(name);
        let state = scene_state(
            &context,
            current_label,
            current_line,
            self.coordinator.game_base(),
            None,
            tracked_image,
            tracked_screen,
        );
        Ok(Some(scene_state_body(&state)))
    }

    fn handle_get_image_definition(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: GetImageDefinitionArguments = parse_args(&msg.arguments)?;
        let location = get_image_definition(self.coordinator.game_base(), None, &args.tag, &args.attributes);
        Ok(Some(match location {
            Some(loc) => json!({ "found": true, "file": loc.file.to_string_lossy(), "line": loc.line }),
            None => json!({ "found": false }),
        }))
    }

    fn handle_source(&self, msg: &InboundMessage) -> Result<Option<Value>, DapError> {
        let args: SourceArguments = parse_args(&msg.arguments)?;
        let path = args
            .source
            .and_then(|s| s.path)
            .ok_or_else(|| DapError::client_protocol("source requires source.path"))?;
        let resolved = resolve_path(&path, self.coordinator.game_base());
        let content = std::fs::read_to_string(&resolved).map_err(|e| DapError::io(e.to_string()))?;
        Ok(Some(json!({ "content": content, "mimeType": "text/plain" })))
    }

    fn handle_exception_info(&self) -> Result<Option<Value>, DapError> {
        let exception = self
            .coordinator
            .host()
            .last_exception()
            .ok_or_else(|| DapError::state_invalid("no exception is currently active"))?;
        Ok(Some(json!({
            "exceptionId": exception.qualified_type_name,
            "description": exception.message,
            "breakMode": "always",
            "details": {
                "message": exception.message,
                "typeName": exception.type_name,
                "fullTypeName": exception.qualified_type_name,
                "stackTrace": exception.traceback,
            },
        })))
    }
}

fn outcome_body(outcome: EvalOutcome, key: &str) -> Result<Value, DapError> {
    let mut map = Map::new();
    match outcome {
        EvalOutcome::Value(value) => {
            map.insert(key.to_string(), Value::String(format_value(&value)));
            map.insert("type".to_string(), Value::String(value.type_name));
            map.insert("variablesReference".to_string(), json!(0));
        }
        EvalOutcome::Ok => {
            map.insert(key.to_string(), Value::String(String::new()));
            map.insert("type".to_string(), Value::String("NoneType".to_string()));
            map.insert("variablesReference".to_string(), json!(0));
        }
        EvalOutcome::Error(message) | EvalOutcome::SyntaxError(message) => {
            return Err(DapError::evaluation_failed(message))
        }
    }
    Ok(Value::Object(map))
}

/// `evaluate`'s own response body, per spec: `watch`/`repl` render a failed
/// evaluation as a success body with `result="Error: …"`; `hover` swallows
/// the error entirely and returns an empty result. Never a DAP failure
/// response, regardless of context.
fn evaluate_body(outcome: EvalOutcome, context: EvalContext) -> Value {
    match outcome {
        EvalOutcome::Value(value) => json!({
            "result": format_value(&value),
            "type": value.type_name,
            "variablesReference": 0,
        }),
        EvalOutcome::Ok => json!({
            "result": String::new(),
            "type": "NoneType",
            "variablesReference": 0,
        }),
        EvalOutcome::Error(message) | EvalOutcome::SyntaxError(message) => {
            if context == EvalContext::Hover {
                json!({ "result": "", "variablesReference": 0 })
            } else {
                json!({
                    "result": format!("Error: {message}"),
                    "type": "error",
                    "variablesReference": 0,
                })
            }
        }
    }
}

fn scene_state_body(state: &crate::scene::SceneState) -> Value {
    let layers: Vec<Value> = state
        .layers
        .iter()
        .map(|layer| {
            let images: Vec<Value> = layer
                .images
                .iter()
                .map(|image| {
                    json!({
                        "tag": image.tag,
                        "layer": image.layer,
                        "attributes": image.attributes,
                        "file": image.file,
                        "position": image.position,
                        "definition": image.definition.as_ref().map(|d| json!({ "file": d.file.to_string_lossy(), "line": d.line })),
                        "showStatement": image.show_statement.as_ref().map(|s| json!({ "file": s.file, "line": s.line })),
                        "statementType": image.statement_type,
                        "isLayered": image.is_layered,
                        "components": image.components.iter().map(|c| json!({
                            "attribute": c.attribute,
                            "group": c.group,
                            "file": c.file,
                            "definition": c.definition.as_ref().map(|d| json!({ "file": d.file.to_string_lossy(), "line": d.line })),
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect();
            json!({ "layer": layer.layer, "images": images })
        })
        .collect();

    let screens: Vec<Value> = state
        .screens
        .iter()
        .map(|screen| {
            json!({
                "name": screen.name,
                "layer": screen.layer,
                "definition": screen.definition.as_ref().map(|d| json!({ "file": d.file.to_string_lossy(), "line": d.line })),
                "showStatement": screen.show_statement.as_ref().map(|s| json!({ "file": s.file, "line": s.line })),
            })
        })
        .collect();

    json!({
        "currentLabel": state.current_label,
        "currentLine": state.current_line,
        "currentSpeaker": state.current_speaker,
        "layers": layers,
        "screens": screens,
        "audio": {
            "music": state.audio.music,
            "sound": state.audio.sound,
            "voice": state.audio.voice,
        },
    })
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SourceArg {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceBreakpointArg {
    line: u32,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    hit_condition: Option<String>,
    #[serde(default)]
    log_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetBreakpointsArguments {
    #[serde(default)]
    source: SourceArg,
    #[serde(default)]
    breakpoints: Vec<SourceBreakpointArg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionBreakpointArg {
    name: String,
    #[serde(default)]
    condition: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetFunctionBreakpointsArguments {
    #[serde(default)]
    breakpoints: Vec<FunctionBreakpointArg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetExceptionBreakpointsArguments {
    #[serde(default)]
    filters: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariablesArguments {
    variables_reference: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetVariableArguments {
    variables_reference: i64,
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetExpressionArguments {
    expression: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateArguments {
    expression: String,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionsArguments {
    text: String,
    column: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GotoTargetsArguments {
    #[serde(default)]
    source: SourceArg,
    #[allow(dead_code)]
    #[serde(default)]
    line: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GotoArguments {
    target_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunToLineArguments {
    #[serde(default)]
    source: SourceArg,
    line: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JumpToLabelArguments {
    label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetImageDefinitionArguments {
    tag: String,
    #[serde(default)]
    attributes: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SourceArguments {
    #[serde(default)]
    source: Option<SourceArg>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{
        AudioState, ExceptionInfo, HostContext, LabelSite, ScriptHost, StatementControl, StatementNode,
    };
    use crate::value::TypedValue;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct StubHost;

    #[async_trait]
    impl ScriptHost for StubHost {
        fn label_map(&self) -> HashMap<String, LabelSite> {
            let mut m = HashMap::new();
            m.insert("start".to_string(), LabelSite { file: "/g/s.rpy".to_string(), line: 3 });
            m
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
            EvalOutcome::Value(TypedValue::raw("int", "1"))
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

    fn dispatcher() -> Dispatcher {
        let (coordinator, _rx) = Coordinator::new(Arc::new(StubHost), PathBuf::from("/g"), ".rpy".to_string());
        Dispatcher::new(coordinator)
    }

    fn request(seq: i64, command: &str, arguments: Value) -> InboundMessage {
        InboundMessage { seq, kind: "request".to_string(), command: command.to_string(), arguments }
    }

    #[tokio::test]
    async fn initialize_returns_capability_body() {
        let dispatcher = dispatcher();
        let response = dispatcher.handle(request(1, "initialize", json!({}))).await;
        assert!(response.success);
        let body = response.body.unwrap();
        assert_eq!(body["supportsStepBack"], json!(true));
    }

    #[tokio::test]
    async fn unknown_command_fails() {
        let dispatcher = dispatcher();
        let response = dispatcher.handle(request(1, "frobnicate", json!({}))).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn set_breakpoints_round_trips_verification() {
        let dispatcher = dispatcher();
        let response = dispatcher
            .handle(request(
                1,
                "setBreakpoints",
                json!({ "source": { "path": "/g/s.rpy" }, "breakpoints": [{ "line": 10 }] }),
            ))
            .await;
        assert!(response.success);
        let breakpoints = response.body.unwrap()["breakpoints"].as_array().unwrap().clone();
        assert_eq!(breakpoints.len(), 1);
        assert_eq!(breakpoints[0]["line"], json!(10));
    }

    #[tokio::test]
    async fn goto_targets_lists_known_labels() {
        let dispatcher = dispatcher();
        let response = dispatcher
            .handle(request(1, "gotoTargets", json!({ "source": { "path": "/g/s.rpy" }, "line": 1 })))
            .await;
        assert!(response.success);
        let targets = response.body.unwrap()["targets"].as_array().unwrap().clone();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0]["label"], json!("start"));
    }

    #[tokio::test]
    async fn jump_to_label_rejects_unknown_label() {
        let dispatcher = dispatcher();
        let response = dispatcher.handle(request(1, "jumpToLabel", json!({ "label": "nowhere" }))).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn evaluate_formats_scalar_result() {
        let dispatcher = dispatcher();
        let response = dispatcher.handle(request(1, "evaluate", json!({ "expression": "1 + 1" }))).await;
        assert!(response.success);
        assert_eq!(response.body.unwrap()["result"], json!("1"));
    }

    struct FlakyHost;

    #[async_trait]
    impl ScriptHost for FlakyHost {
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

        async fn eval(&self, expr: &str, _context: EvalContext) -> EvalOutcome {
            match expr {
                "1/0" => EvalOutcome::Error("division by zero".to_string()),
                "x = 1" => EvalOutcome::SyntaxError("invalid syntax".to_string()),
                _ => EvalOutcome::Value(TypedValue::raw("int", "1")),
            }
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

    fn flaky_dispatcher() -> Dispatcher {
        let (coordinator, _rx) = Coordinator::new(Arc::new(FlakyHost), PathBuf::from("/g"), ".rpy".to_string());
        Dispatcher::new(coordinator)
    }

    #[tokio::test]
    async fn evaluate_hover_swallows_errors_as_an_empty_success() {
        let dispatcher = flaky_dispatcher();
        let response = dispatcher
            .handle(request(1, "evaluate", json!({ "expression": "1/0", "context": "hover" })))
            .await;
        assert!(response.success);
        let body = response.body.unwrap();
        assert_eq!(body["result"], json!(""));
        assert!(body.get("type").is_none());
    }

    #[tokio::test]
    async fn evaluate_watch_reports_errors_as_a_success_body() {
        let dispatcher = flaky_dispatcher();
        let response = dispatcher
            .handle(request(1, "evaluate", json!({ "expression": "1/0", "context": "watch" })))
            .await;
        assert!(response.success);
        let body = response.body.unwrap();
        assert_eq!(body["result"], json!("Error: division by zero"));
        assert_eq!(body["type"], json!("error"));
    }

    #[tokio::test]
    async fn evaluate_repl_falls_back_to_exec_on_syntax_error() {
        let dispatcher = flaky_dispatcher();
        let response = dispatcher
            .handle(request(1, "evaluate", json!({ "expression": "x = 1", "context": "repl" })))
            .await;
        assert!(response.success);
        assert_eq!(response.body.unwrap()["result"], json!("OK"));
    }

    #[tokio::test]
    async fn exception_info_fails_when_no_exception_is_active() {
        let dispatcher = dispatcher();
        let response = dispatcher.handle(request(1, "exceptionInfo", json!({}))).await;
        assert!(!response.success);
    }
}
