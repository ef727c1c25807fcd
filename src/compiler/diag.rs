//! Shared diagnostic formatting.
//!
//! Every compiler error is framed the same way: a 70-character rule, a phase
//! header with the source position, the message, an optional source-line
//! excerpt with a caret, and an optional multi-line hint.

use std::fmt::Write;

pub const RULE_WIDTH: usize = 70;

pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

pub fn summary_rule() -> String {
    "#".repeat(RULE_WIDTH)
}

/// Render one framed error. `position` is `Some((line, column))` when the
/// error is pinned to a source location; `source_line` is the raw text of
/// that line, used for the caret excerpt.
pub fn format_error(
    phase: &str,
    position: Option<(u32, u32)>,
    message: &str,
    source_line: Option<&str>,
    hint: Option<&str>,
) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&rule());
    out.push('\n');
    match position {
        Some((line, column)) => {
            let _ = writeln!(out, "{} at Line {}, Column {}", phase, line, column);
        }
        None => {
            let _ = writeln!(out, "{}", phase);
        }
    }
    out.push_str(&rule());
    out.push('\n');
    let _ = writeln!(out, "Error: {}", message);

    if let (Some(text), Some((line, column))) = (source_line, position) {
        let _ = writeln!(out, "\n{:>4} | {}", line, text);
        let pad = column.saturating_sub(1) as usize;
        let _ = writeln!(out, "     | {}^", " ".repeat(pad));
    }

    if let Some(hint) = hint {
        let _ = writeln!(out, "\nHint: {}", hint);
    }

    out.push_str(&rule());
    out.push('\n');
    out
}

/// The bundled-failure header: `COMPILATION FAILED: Found N <what>(s)`,
/// framed by `#` rules.
pub fn format_failure_summary(count: usize, what: &str) -> String {
    format!(
        "\n{}\nCOMPILATION FAILED: Found {} {}(s)\n{}\n",
        summary_rule(),
        count,
        what,
        summary_rule()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framed_error_has_rules_and_caret() {
        let msg = format_error(
            "LEXER ERROR",
            Some((3, 5)),
            "Unexpected character '@' (ASCII 64)",
            Some("var @x = 1;"),
            Some("'@' is not a valid Box operator."),
        );
        assert!(msg.contains(&rule()));
        assert!(msg.contains("LEXER ERROR at Line 3, Column 5"));
        assert!(msg.contains("   3 | var @x = 1;"));
        assert!(msg.contains("     |     ^"));
        assert!(msg.contains("Hint: '@'"));
    }

    #[test]
    fn test_summary_counts() {
        let s = format_failure_summary(2, "lexical error");
        assert!(s.contains("COMPILATION FAILED: Found 2 lexical error(s)"));
    }
}
