//! Process termination abstraction.
//!
//! Fatal paths (uncaught script error, protocol violation, failed
//! bootstrap) end the process through a `ProcessExit` so tests can
//! observe the exit code instead of dying.

use std::sync::Mutex;

/// Terminates the process.
///
/// Production implementations do not return. Test doubles record the
/// code and return.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

/// `std::process::exit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsExit;

impl ProcessExit for OsExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Records exit codes instead of exiting.
#[derive(Debug, Default)]
pub struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl RecordingExit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every code passed to `exit()`, oldest first.
    pub fn codes(&self) -> Vec<i32> {
        match self.codes.lock() {
            Ok(codes) => codes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last(&self) -> Option<i32> {
        self.codes().last().copied()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        match self.codes.lock() {
            Ok(mut codes) => codes.push(code),
            Err(poisoned) => poisoned.into_inner().push(code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_exit() {
        let exit = RecordingExit::new();
        assert_eq!(exit.last(), None);
        exit.exit(1);
        exit.exit(0);
        assert_eq!(exit.codes(), vec![1, 0]);
        assert_eq!(exit.last(), Some(0));
    }
}
