//! Text and JSON output.

use authcode_totp::totp::core::format_code_display;
use anyhow::Context;
use authcode_totp::totp::{Board, BoardRow, ERROR_INDICATOR, REDACTED};
use serde::Serialize;
use std::fmt::Write as _;
use std::io;

use crate::cli::OutputFormat;
use crate::commands::{ChangeReport, CodeReport, HistoryRow};

const BAR_WIDTH: usize = 20;

/// ANSI: clear screen and move the cursor home.
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<String> {
    let out = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    out.context("Failed to encode output as JSON")
}

/// `[██████░░░░]` showing the time left in the window.
pub fn progress_bar(progress: f64, width: usize) -> String {
    let remaining = (1.0 - progress.clamp(0.0, 1.0)) * width as f64;
    let filled = (remaining.round() as usize).min(width);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}

fn grouped(code: &str) -> String {
    if code == REDACTED || code == ERROR_INDICATOR {
        code.to_string()
    } else {
        format_code_display(code)
    }
}

pub fn code_text(report: &CodeReport) -> String {
    let verb = if report.created { "added" } else { "updated" };
    format!(
        "{}  ({}s left)\n{} \"{}\" [{}]",
        report.grouped, report.remaining_seconds, verb, report.name, report.entry_id
    )
}

pub fn history_text(rows: &[HistoryRow]) -> String {
    if rows.is_empty() {
        return "No history entries.".to_string();
    }
    let width = rows.iter().map(|r| r.name.chars().count()).max().unwrap_or(0);
    let mut out = String::new();
    for row in rows {
        let _ = writeln!(
            out,
            "{:<width$}  {:>7}  {:>2}s  seed: {}  id: {}",
            row.name,
            grouped(&row.code),
            row.remaining_seconds,
            row.seed,
            row.id,
            width = width
        );
    }
    out.trim_end().to_string()
}

pub fn change_text(report: &ChangeReport) -> String {
    match (report.action, report.name.as_deref()) {
        ("rename", Some(name)) => format!("Renamed to \"{}\"", name),
        ("delete", Some(name)) => format!("Deleted \"{}\"", name),
        ("clear", _) => format!("Cleared {} entries", report.removed),
        ("reset", _) => format!("Reset: removed {} entries and the history file", report.removed),
        (action, _) => action.to_string(),
    }
}

fn board_row(out: &mut String, row: &BoardRow, width: usize) {
    let _ = write!(
        out,
        "{:<width$}  {:>7}  {} {:>2}s",
        row.name,
        grouped(&row.code),
        progress_bar(row.progress, BAR_WIDTH),
        row.remaining_seconds,
        width = width
    );
    if let Some(seed) = &row.seed_preview {
        let _ = write!(out, "  seed: {}", seed);
    }
    out.push('\n');
}

pub fn board_text(board: &Board) -> String {
    let width = board
        .primary
        .iter()
        .chain(board.entries.iter())
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    if let Some(primary) = &board.primary {
        board_row(&mut out, primary, width);
        out.push('\n');
    }
    if board.entries.is_empty() {
        out.push_str("No history entries.\n");
    } else {
        for row in &board.entries {
            board_row(&mut out, row, width);
        }
    }
    let _ = write!(
        out,
        "\nprivacy: {}   Ctrl-C to quit",
        if board.privacy_mode { "on" } else { "off" }
    );
    out
}

/// Write one `watch` frame: an NDJSON line, or the board text (cleared
/// first when `interactive`).
pub fn write_frame<W: io::Write>(
    out: &mut W,
    board: &Board,
    format: OutputFormat,
    interactive: bool,
) -> anyhow::Result<()> {
    let written = if format.is_json() {
        writeln!(out, "{}", to_json(board, false)?)
    } else if interactive {
        writeln!(out, "{}{}", CLEAR_SCREEN, board_text(board))
    } else {
        writeln!(out, "{}\n", board_text(board))
    };
    written
        .and_then(|_| out.flush())
        .context("Failed to write output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use authcode_totp::totp::SlotId;

    fn row(name: &str, code: &str, progress: f64, seed: Option<&str>) -> BoardRow {
        BoardRow {
            slot: SlotId::Entry(name.to_string()),
            entry_id: Some(name.to_string()),
            name: name.to_string(),
            code: code.to_string(),
            remaining_seconds: 15,
            progress,
            seed_preview: seed.map(str::to_string),
            failed: code == ERROR_INDICATOR,
        }
    }

    #[test]
    fn progress_bar_shrinks() {
        assert_eq!(progress_bar(0.0, 4), "[████]");
        assert_eq!(progress_bar(0.5, 4), "[██░░]");
        assert_eq!(progress_bar(1.0, 4), "[░░░░]");
    }

    #[test]
    fn grouping_skips_markers() {
        assert_eq!(grouped("996554"), "996 554");
        assert_eq!(grouped(REDACTED), REDACTED);
        assert_eq!(grouped(ERROR_INDICATOR), ERROR_INDICATOR);
    }

    #[test]
    fn board_lists_primary_then_entries() {
        let board = Board {
            privacy_mode: false,
            primary: Some(row("Current", "996554", 0.5, None)),
            entries: vec![row("Bank", "602287", 0.5, Some("***")), row("Broken", "ERROR", 0.5, None)],
        };
        let text = board_text(&board);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Current"));
        assert!(lines[0].contains("996 554"));
        assert!(lines[2].contains("602 287"));
        assert!(lines[2].contains("seed: ***"));
        assert!(lines[3].contains("ERROR"));
        assert!(text.ends_with("privacy: off   Ctrl-C to quit"));
    }

    struct BrokenPipe;

    impl io::Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn empty_board() -> Board {
        Board {
            privacy_mode: true,
            primary: None,
            entries: Vec::new(),
        }
    }

    #[test]
    fn frame_as_ndjson_line() {
        let mut out = Vec::new();
        write_frame(&mut out, &empty_board(), OutputFormat::Json, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with(r#"{"privacyMode":true"#));
    }

    #[test]
    fn write_failure_is_an_io_error() {
        let err = write_frame(&mut BrokenPipe, &empty_board(), OutputFormat::Text, true).unwrap_err();
        let chain = format!("{:#}", err);
        assert!(chain.starts_with("Failed to write output"), "{}", chain);
        assert!(!chain.contains("InvalidInput"));
        let io_err = err.downcast_ref::<io::Error>().unwrap();
        assert_eq!(io_err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn encode_failure_has_context() {
        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1u8], 1u8);
        let err = to_json(&bad, false).unwrap_err();
        assert!(format!("{:#}", err).starts_with("Failed to encode output as JSON: "));
        assert!(err.downcast_ref::<serde_json::Error>().is_some());
    }

    #[test]
    fn empty_history_text() {
        assert_eq!(history_text(&[]), "No history entries.");
    }

    #[test]
    fn json_output() {
        let report = ChangeReport {
            action: "clear",
            id: None,
            name: None,
            removed: 3,
        };
        let json = to_json(&report, false).unwrap();
        assert_eq!(json, r#"{"action":"clear","id":null,"name":null,"removed":3}"#);
        assert_eq!(change_text(&report), "Cleared 3 entries");
    }
}
