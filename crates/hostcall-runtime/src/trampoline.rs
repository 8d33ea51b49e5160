//! Global error trampoline.
//!
//! The single registered entry point for uncaught script errors. It
//! prints the error, then decides whether the process survives: errors
//! from the interactive source are reported and execution continues,
//! anything else ends the process with exit code 1.

use std::sync::Arc;

use hostcall_core::bridge::{ErrorValue, HostBridge, UncaughtError};
use hostcall_core::exit::ProcessExit;
use hostcall_core::{kdebug, kprintln};

use crate::config::DEFAULT_INTERACTIVE_SOURCE;

/// What the trampoline did with one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrampolineOutcome {
    /// Printed; the script context keeps running.
    Reported,
    /// Printed; `ProcessExit::exit(1)` was called.
    Fatal,
}

pub struct ErrorTrampoline {
    interactive_source: String,
    exit: Arc<dyn ProcessExit>,
}

impl ErrorTrampoline {
    pub fn new(interactive_source: impl Into<String>, exit: Arc<dyn ProcessExit>) -> Self {
        Self {
            interactive_source: interactive_source.into(),
            exit,
        }
    }

    pub fn with_default_source(exit: Arc<dyn ProcessExit>) -> Self {
        Self::new(DEFAULT_INTERACTIVE_SOURCE, exit)
    }

    pub fn interactive_source(&self) -> &str {
        &self.interactive_source
    }

    /// A missing source never counts as interactive.
    pub fn is_interactive(&self, source: Option<&str>) -> bool {
        source == Some(self.interactive_source.as_str())
    }

    /// Lines printed for `err`, in order.
    pub fn render(&self, err: &UncaughtError) -> Vec<String> {
        let mut lines = vec![render_value(&err.value)];
        if !self.is_interactive(err.source.as_deref()) {
            lines.push(format!("Source: {}", err.source.as_deref().unwrap_or("undefined")));
        }
        lines
    }

    pub fn handle(&self, err: UncaughtError) -> TrampolineOutcome {
        kdebug!(
            "uncaught error at {}:{}:{}: {}",
            err.source.as_deref().unwrap_or("?"),
            err.line,
            err.column,
            err.message
        );
        for line in self.render(&err) {
            kprintln!("{}", line);
        }
        if self.is_interactive(err.source.as_deref()) {
            TrampolineOutcome::Reported
        } else {
            self.exit.exit(1);
            TrampolineOutcome::Fatal
        }
    }

    /// Register with the bridge as the global error handler.
    pub fn install<B: HostBridge + ?Sized>(self, bridge: &B) {
        let this = Arc::new(self);
        bridge.set_global_error_handler(Box::new(move |err| {
            this.handle(err);
        }));
    }
}

fn render_value(value: &ErrorValue) -> String {
    match value {
        ErrorValue::Structured { stack: Some(stack), .. } => stack.clone(),
        ErrorValue::Structured { name, message, stack: None } => format!("{}: {}", name, message),
        ErrorValue::Thrown(v) => format!("Thrown: {}", v),
    }
}
