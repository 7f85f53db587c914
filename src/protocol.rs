//! DAP message types and the capability set the `initialize` response
//! advertises.
//!
//! The capabilities object is built out of small `#[serde(flatten)]`
//! sub-structs rather than one flat struct, so each capability group can be
//! documented and tested on its own.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed inbound message, before dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Client-assigned sequence number.
    pub seq: i64,
    /// `"request"` for every message a client sends.
    #[serde(rename = "type")]
    pub kind: String,
    /// DAP command name.
    pub command: String,
    /// Command-specific arguments, if any.
    #[serde(default)]
    pub arguments: Value,
}

/// A response to a single request.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    /// Server-assigned sequence number.
    pub seq: i64,
    #[serde(rename = "type")]
    kind: &'static str,
    /// The `seq` of the request this responds to.
    pub request_seq: i64,
    /// Whether the request succeeded.
    pub success: bool,
    /// Echoes the request's command.
    pub command: String,
    /// Error detail, present only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response body, present only on success (or when a failure carries a body).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// Build a success response.
    #[must_use]
    pub fn success(seq: i64, request_seq: i64, command: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq,
            kind: "response",
            request_seq,
            success: true,
            command: command.into(),
            message: None,
            body,
        }
    }

    /// Build a failure response.
    #[must_use]
    pub fn failure(seq: i64, request_seq: i64, command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            seq,
            kind: "response",
            request_seq,
            success: false,
            command: command.into(),
            message: Some(message.into()),
            body: None,
        }
    }
}

/// An asynchronous event (`stopped`, `continued`, `output`, …).
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Server-assigned sequence number.
    pub seq: i64,
    #[serde(rename = "type")]
    kind: &'static str,
    /// Event name.
    pub event: String,
    /// Event body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    /// Build an event message.
    #[must_use]
    pub fn new(seq: i64, event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq,
            kind: "event",
            event: event.into(),
            body,
        }
    }
}

/// One entry in `exceptionBreakpointFilters`.
#[derive(Debug, Clone, Serialize)]
pub struct ExceptionBreakpointFilter {
    /// Filter id (`"raised"` / `"uncaught"`).
    pub filter: &'static str,
    /// Display label.
    pub label: &'static str,
    /// Description shown in IDE UI.
    pub description: &'static str,
    /// Whether the filter is enabled by default.
    pub default: bool,
}

/// Breakpoint-related capability flags.
#[derive(Debug, Clone, Serialize)]
pub struct BreakpointCapabilities {
    #[serde(rename = "supportsFunctionBreakpoints")]
    pub function_breakpoints: bool,
    #[serde(rename = "supportsConditionalBreakpoints")]
    pub conditional_breakpoints: bool,
    #[serde(rename = "supportsHitConditionalBreakpoints")]
    pub hit_conditional_breakpoints: bool,
    #[serde(rename = "supportsLogPoints")]
    pub log_points: bool,
    #[serde(rename = "supportsDataBreakpoints")]
    pub data_breakpoints: bool,
    #[serde(rename = "supportsInstructionBreakpoints")]
    pub instruction_breakpoints: bool,
    #[serde(rename = "supportsBreakpointLocationsRequest")]
    pub breakpoint_locations: bool,
}

/// Stepping-related capability flags.
#[derive(Debug, Clone, Serialize)]
pub struct SteppingCapabilities {
    #[serde(rename = "supportsStepBack")]
    pub step_back: bool,
    #[serde(rename = "supportsStepInTargetsRequest")]
    pub step_in_targets: bool,
    #[serde(rename = "supportsSteppingGranularity")]
    pub stepping_granularity: bool,
}

/// Variable/evaluation-related capability flags.
#[derive(Debug, Clone, Serialize)]
pub struct VariableCapabilities {
    #[serde(rename = "supportsSetVariable")]
    pub set_variable: bool,
    #[serde(rename = "supportsSetExpression")]
    pub set_expression: bool,
    #[serde(rename = "supportsEvaluateForHovers")]
    pub evaluate_for_hovers: bool,
    #[serde(rename = "supportsCompletionsRequest")]
    pub completions: bool,
    #[serde(rename = "supportsValueFormattingOptions")]
    pub value_formatting: bool,
    #[serde(rename = "supportsClipboardContext")]
    pub clipboard_context: bool,
}

/// Lifecycle/misc capability flags.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleCapabilities {
    #[serde(rename = "supportsConfigurationDoneRequest")]
    pub configuration_done: bool,
    #[serde(rename = "supportsRestartFrame")]
    pub restart_frame: bool,
    #[serde(rename = "supportsGotoTargetsRequest")]
    pub goto_targets: bool,
    #[serde(rename = "supportsModulesRequest")]
    pub modules: bool,
    #[serde(rename = "supportsExceptionOptions")]
    pub exception_options: bool,
    #[serde(rename = "supportsExceptionInfoRequest")]
    pub exception_info: bool,
    #[serde(rename = "supportTerminateDebuggee")]
    pub terminate_debuggee: bool,
    #[serde(rename = "supportsDelayedStackTraceLoading")]
    pub delayed_stack_trace_loading: bool,
    #[serde(rename = "supportsLoadedSourcesRequest")]
    pub loaded_sources: bool,
    #[serde(rename = "supportsTerminateThreadsRequest")]
    pub terminate_threads: bool,
    #[serde(rename = "supportsTerminateRequest")]
    pub terminate_request: bool,
    #[serde(rename = "supportsReadMemoryRequest")]
    pub read_memory: bool,
    #[serde(rename = "supportsDisassembleRequest")]
    pub disassemble: bool,
    #[serde(rename = "supportsCancelRequest")]
    pub cancel: bool,
    #[serde(rename = "supportsExceptionFilterOptions")]
    pub exception_filter_options: bool,
}

/// The complete `initialize` response capability object, composed from the
/// sub-structs above with `#[serde(flatten)]` so the wire shape is one flat
/// JSON object, matching standard DAP.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    #[serde(flatten)]
    pub breakpoints: BreakpointCapabilities,
    #[serde(flatten)]
    pub stepping: SteppingCapabilities,
    #[serde(flatten)]
    pub variables: VariableCapabilities,
    #[serde(flatten)]
    pub lifecycle: LifecycleCapabilities,
    #[serde(rename = "exceptionBreakpointFilters")]
    pub exception_breakpoint_filters: Vec<ExceptionBreakpointFilter>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            breakpoints: BreakpointCapabilities {
                function_breakpoints: true,
                conditional_breakpoints: true,
                hit_conditional_breakpoints: true,
                log_points: true,
                data_breakpoints: false,
                instruction_breakpoints: false,
                breakpoint_locations: false,
            },
            stepping: SteppingCapabilities {
                step_back: true,
                step_in_targets: false,
                stepping_granularity: false,
            },
            variables: VariableCapabilities {
                set_variable: true,
                set_expression: true,
                evaluate_for_hovers: true,
                completions: true,
                value_formatting: false,
                clipboard_context: false,
            },
            lifecycle: LifecycleCapabilities {
                configuration_done: true,
                restart_frame: false,
                goto_targets: true,
                modules: false,
                exception_options: true,
                exception_info: true,
                terminate_debuggee: true,
                delayed_stack_trace_loading: false,
                loaded_sources: false,
                terminate_threads: false,
                terminate_request: true,
                read_memory: false,
                disassemble: false,
                cancel: false,
                exception_filter_options: true,
            },
            exception_breakpoint_filters: vec![
                ExceptionBreakpointFilter {
                    filter: "raised",
                    label: "Raised Exceptions",
                    description: "Break when any exception is raised",
                    default: false,
                },
                ExceptionBreakpointFilter {
                    filter: "uncaught",
                    label: "Uncaught Exceptions",
                    description: "Break on exceptions not caught by the game",
                    default: true,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_serialize_flat() {
        let caps = Capabilities::default();
        let value = serde_json::to_value(&caps).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.get("supportsStepBack").unwrap(), &Value::Bool(true));
        assert_eq!(obj.get("supportsDataBreakpoints").unwrap(), &Value::Bool(false));
        assert!(obj.get("exceptionBreakpointFilters").unwrap().is_array());
    }

    #[test]
    fn response_without_body_omits_field() {
        let response = Response::success(2, 1, "pause", None);
        let value = serde_json::to_value(&response).unwrap();
        assert!(!value.as_object().unwrap().contains_key("body"));
    }

    #[test]
    fn failure_response_carries_message() {
        let response = Response::failure(2, 1, "pause", "not paused");
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("not paused"));
    }
}
