//! What the script context does once bootstrap completes.

use crate::bootstrap::BootState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPlan {
    /// No input script: hand control to the interactive loop.
    Interactive,
    /// Print the main module's dependency list, then exit 0.
    PrintDeps { main: String },
    /// Compile (or recompile) and run the main module.
    Run { main: String, recompile: bool },
}

impl EntryPlan {
    pub fn from_boot(state: &BootState) -> Self {
        match state.main_module() {
            None => EntryPlan::Interactive,
            Some(main) if state.deps_flag() => EntryPlan::PrintDeps { main: main.to_string() },
            Some(main) => EntryPlan::Run {
                main: main.to_string(),
                recompile: state.recompile_flag(),
            },
        }
    }

    pub fn main_module(&self) -> Option<&str> {
        match self {
            EntryPlan::Interactive => None,
            EntryPlan::PrintDeps { main } | EntryPlan::Run { main, .. } => Some(main),
        }
    }
}
