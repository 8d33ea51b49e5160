//! Process panic hook.

use hostcall_core::kprintln;

pub fn panic_line(file: &str, line: u32) -> String {
    format!("PANIC file '{}' line {}", file, line)
}

/// Print the panic location and abort.
///
/// A panic in the dispatch core must never unwind back across the bridge
/// into the host.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        match info.location() {
            Some(loc) => kprintln!("{}", panic_line(loc.file(), loc.line())),
            None => kprintln!("PANIC occurred but location is unavailable"),
        }
        std::process::abort();
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_line() {
        assert_eq!(panic_line("src/lib.rs", 42), "PANIC file 'src/lib.rs' line 42");
    }
}
