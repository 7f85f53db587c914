//! `vnscript-dap` server binary.
//!
//! This wires the engine up to a placeholder script host so the binary
//! builds and the wire/dispatch layers can be smoke-tested end to end. A
//! real deployment swaps [`DemoHost`] for an adapter over the actual script
//! runtime.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use vnscript_dap::config::DapServerConfig;
use vnscript_dap::coordinator::Coordinator;
use vnscript_dap::host::{
    AudioState, ExceptionInfo, HostContext, LabelSite, ScriptHost, StatementControl, StatementNode, TraceEvent,
};
use vnscript_dap::server;
use vnscript_dap::value::TypedValue;

/// A script host with a single `start` label and no interpreter behind it.
/// Good enough to exercise `initialize`/`setBreakpoints`/`evaluate`/etc. over
/// the wire; not a substitute for a real runtime adapter.
struct DemoHost {
    skip_mode: AtomicBool,
}

#[async_trait]
impl ScriptHost for DemoHost {
    fn label_map(&self) -> HashMap<String, LabelSite> {
        let mut labels = HashMap::new();
        labels.insert(
            "start".to_string(),
            LabelSite {
                file: "script.rpy".to_string(),
                line: 1,
            },
        );
        labels
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

    async fn rollback_one_checkpoint(&self) -> Result<()> {
        anyhow::bail!("this host keeps no checkpoints")
    }

    fn set_skip_mode(&self, enabled: bool) {
        self.skip_mode.store(enabled, Ordering::SeqCst);
    }

    fn post_tick(&self) {}

    async fn eval(&self, expr: &str, _context: vnscript_dap::host::EvalContext) -> vnscript_dap::host::EvalOutcome {
        vnscript_dap::host::EvalOutcome::Value(TypedValue::raw("str", format!("<unevaluated: {expr}>")))
    }

    async fn exec(&self, _stmt: &str) -> vnscript_dap::host::EvalOutcome {
        vnscript_dap::host::EvalOutcome::Ok
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

    async fn set_local(&self, _name: &str, _value_expr: &str) -> vnscript_dap::host::EvalOutcome {
        vnscript_dap::host::EvalOutcome::Ok
    }

    async fn set_global(&self, _name: &str, _value_expr: &str) -> vnscript_dap::host::EvalOutcome {
        vnscript_dap::host::EvalOutcome::Ok
    }

    async fn invoke_on_script_thread(&self, f: Box<dyn FnOnce() + Send>, _timeout: std::time::Duration) -> Result<()> {
        f();
        Ok(())
    }

    fn on_reload(&self, _callback: Box<dyn Fn() + Send + Sync>) {}

    fn request_quit(&self) {
        info!("DemoHost received request_quit");
    }

    fn register_statement_callback(&self, _callback: Arc<dyn Fn(&StatementNode) -> StatementControl + Send + Sync>) {}

    fn last_exception(&self) -> Option<ExceptionInfo> {
        None
    }

    fn install_expression_trace(&self, _callback: Arc<dyn Fn(TraceEvent) + Send + Sync>) {
        info!("DemoHost does not drive a real expression interpreter; expression trace is a no-op");
    }

    fn uninstall_expression_trace(&self) {}
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = DapServerConfig::load(&PathBuf::from("vnscript-dap.toml"))?.with_env_overrides();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_level.clone()))
        .init();

    info!(bind_address = %config.bind_address, port = config.port, "starting vnscript-dap");

    let host: Arc<dyn ScriptHost> = Arc::new(DemoHost {
        skip_mode: AtomicBool::new(false),
    });
    let (coordinator, events_rx) = Coordinator::new(host, PathBuf::from("."), ".rpy".to_string());

    let addr = config.socket_addr()?;
    server::run(addr, coordinator, events_rx).await
}
