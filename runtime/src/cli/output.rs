//! Output mode flags and terminal styling shared by every subcommand.
//!
//! Global flags are exported by `main` as `PLACERANK_*` environment
//! variables so any module can check them.

use std::io::IsTerminal;

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

pub fn is_json() -> bool {
    flag("PLACERANK_JSON")
}

pub fn is_quiet() -> bool {
    flag("PLACERANK_QUIET")
}

pub fn is_verbose() -> bool {
    flag("PLACERANK_VERBOSE")
}

/// Colors are off with `--no-color`, `NO_COLOR`, or a non-terminal stderr.
pub fn use_color() -> bool {
    !flag("PLACERANK_NO_COLOR")
        && std::env::var_os("NO_COLOR").is_none()
        && std::io::stderr().is_terminal()
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

/// Status symbols, colored when the terminal allows it.
pub struct Styled {
    color: bool,
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}

impl Styled {
    pub fn new() -> Self {
        Self { color: use_color() }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn ok_sym(&self) -> String {
        self.paint("32", "[OK]")
    }

    pub fn warn_sym(&self) -> String {
        self.paint("33", "[!!]")
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_symbols() {
        let s = Styled { color: false };
        assert_eq!(s.ok_sym(), "[OK]");
        assert_eq!(s.warn_sym(), "[!!]");
        assert_eq!(s.bold("x"), "x");
    }

    #[test]
    fn test_colored_symbols_wrap_text() {
        let s = Styled { color: true };
        assert!(s.ok_sym().contains("[OK]"));
        assert!(s.ok_sym().starts_with("\x1b[32m"));
    }
}
