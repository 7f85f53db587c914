//! A Debug Adapter Protocol engine for a visual-novel script runtime.
//!
//! The crate is organized around a wire
//! framer ([`wire`]), a protocol dispatcher ([`dispatch`]), a breakpoint
//! index ([`breakpoints`]), an execution coordinator ([`coordinator`]), a
//! stack/frame builder ([`frames`]), a variable inspector ([`variables`]), a
//! label/goto navigator ([`navigator`]), and a scene inspector ([`scene`]).
//! [`host`] defines the collaborator boundary every script runtime must
//! implement; [`server`] drives the TCP accept loop around all of it.

pub mod breakpoints;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod frames;
pub mod host;
pub mod navigator;
pub mod protocol;
pub mod scene;
pub mod server;
pub mod value;
pub mod variables;
pub mod wire;
