//! Command handlers. Each one locks the shared state, delegates to the
//! service or session, and returns a serialisable report for `render`.

use authcode_totp::totp::clock::seconds_remaining;
use authcode_totp::totp::core::format_code_display;
use authcode_totp::totp::{
    Board, GeneratedCode, HistoryEntry, Session, SlotDisplay, TotpError, TotpServiceState,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReport {
    pub entry_id: String,
    pub name: String,
    pub code: String,
    pub grouped: String,
    pub remaining_seconds: u32,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRow {
    pub id: String,
    pub name: String,
    pub code: String,
    pub remaining_seconds: u32,
    pub seed: String,
    /// RFC 3339 creation time.
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReport {
    pub action: &'static str,
    pub id: Option<String>,
    pub name: Option<String>,
    pub removed: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Codes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn code(
    session: &Session,
    secret: &str,
    name: Option<&str>,
    reveal: bool,
) -> Result<CodeReport, TotpError> {
    let generation = session.submit(secret, name, reveal).await?;
    let privacy = session.privacy_mode();
    let state = session.service();
    let svc = state.lock().await;
    let entry = svc.get_entry(&generation.entry_id)?;

    let code = SlotDisplay::Ready(generation.code.code.clone()).render(privacy);
    Ok(CodeReport {
        entry_id: entry.id.clone(),
        name: entry.display_name.clone(),
        grouped: format_code_display(&code),
        code,
        remaining_seconds: generation.code.remaining_seconds,
        created: generation.created,
    })
}

/// Start the countdowns and return the first frame.
pub async fn watch_start(
    session: &Session,
    secret: Option<&str>,
    name: Option<&str>,
    reveal: bool,
) -> Result<Board, TotpError> {
    if let Some(secret) = secret {
        session.submit(secret, name, reveal).await?;
    }
    session.start().await;
    Ok(session.board().await)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  History
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn history_list(state: &TotpServiceState, privacy: bool) -> Vec<HistoryRow> {
    let svc = state.lock().await;
    let now = svc.clock().now_unix();
    svc.generate_all_codes()
        .into_iter()
        .map(|(entry, result)| history_row(&entry, result, now, privacy))
        .collect()
}

fn history_row(
    entry: &HistoryEntry,
    result: Result<GeneratedCode, TotpError>,
    now: u64,
    privacy: bool,
) -> HistoryRow {
    // A failed slot still counts down with the window it failed in.
    let (display, remaining) = match result {
        Ok(code) => (SlotDisplay::Ready(code.code), code.remaining_seconds),
        Err(e) => {
            log::warn!("Code derivation failed for entry {}: {}", entry.id, e.message);
            (SlotDisplay::Failed, seconds_remaining(now))
        }
    };
    HistoryRow {
        id: entry.id.clone(),
        name: entry.display_name.clone(),
        code: display.render(privacy),
        remaining_seconds: remaining,
        seed: entry.seed_preview(privacy),
        created_at: entry.created_at.to_rfc3339(),
    }
}

pub async fn history_rename(
    state: &TotpServiceState,
    id: &str,
    name: &str,
) -> Result<ChangeReport, TotpError> {
    let mut svc = state.lock().await;
    let entry = svc.rename_entry(id, name)?;
    Ok(ChangeReport {
        action: "rename",
        id: Some(entry.id),
        name: Some(entry.display_name),
        removed: 0,
    })
}

pub async fn history_delete(state: &TotpServiceState, id: &str) -> Result<ChangeReport, TotpError> {
    let mut svc = state.lock().await;
    let entry = svc.delete_entry(id)?;
    Ok(ChangeReport {
        action: "delete",
        id: Some(entry.id),
        name: Some(entry.display_name),
        removed: 1,
    })
}

pub async fn history_clear(state: &TotpServiceState) -> ChangeReport {
    let mut svc = state.lock().await;
    ChangeReport {
        action: "clear",
        id: None,
        name: None,
        removed: svc.clear_history(),
    }
}

pub async fn reset(session: &Session) -> ChangeReport {
    ChangeReport {
        action: "reset",
        id: None,
        name: None,
        removed: session.reset().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authcode_totp::totp::{ManualClock, MemoryStore, TotpErrorKind, TotpService};
    use std::time::Duration;

    const DEMO_SECRET: &str = "JBSWY3DPEHPK3PXP";

    fn session(privacy: bool) -> Session {
        let clock = ManualClock::new(59);
        let service = TotpService::new(Box::new(MemoryStore::new()), clock.clone());
        Session::new(service, clock, Duration::from_millis(20), privacy)
    }

    #[tokio::test]
    async fn code_report() {
        let s = session(false);
        let r = code(&s, "jbsw y3dp ehpk 3pxp", Some("Demo"), false).await.unwrap();
        assert_eq!(r.code, "996554");
        assert_eq!(r.grouped, "996 554");
        assert_eq!(r.name, "Demo");
        assert_eq!(r.remaining_seconds, 1);
        assert!(r.created);
        s.shutdown().await;
    }

    #[tokio::test]
    async fn code_report_with_privacy() {
        let s = session(true);
        let r = code(&s, DEMO_SECRET, None, false).await.unwrap();
        assert_eq!(r.code, "***");
    }

    #[tokio::test]
    async fn code_rejects_bad_secret() {
        let s = session(false);
        let err = code(&s, "JBSW!DPE", None, false).await.unwrap_err();
        assert_eq!(err.kind, TotpErrorKind::InvalidSecret);
        assert!(history_list(&s.service(), false).await.is_empty());
    }

    #[tokio::test]
    async fn history_round() {
        let s = session(false);
        let r = code(&s, DEMO_SECRET, None, true).await.unwrap();
        let state = s.service();

        let rows = history_list(&state, false).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code, "996554");
        assert_eq!(rows[0].seed, DEMO_SECRET);
        assert_eq!(history_list(&state, true).await[0].seed, "***");

        let renamed = history_rename(&state, &r.entry_id, "Bank").await.unwrap();
        assert_eq!(renamed.name.as_deref(), Some("Bank"));
        assert_eq!(
            history_rename(&state, "nope", "x").await.unwrap_err().kind,
            TotpErrorKind::NotFound
        );

        assert_eq!(history_delete(&state, &r.entry_id).await.unwrap().removed, 1);
        code(&s, DEMO_SECRET, None, false).await.unwrap();
        assert_eq!(history_clear(&state).await.removed, 1);
        code(&s, DEMO_SECRET, None, false).await.unwrap();
        assert_eq!(reset(&s).await.removed, 1);
    }

    #[test]
    fn failed_row_keeps_window_countdown() {
        let secret = authcode_totp::totp::codec::normalize(DEMO_SECRET).unwrap();
        let entry = HistoryEntry::new("Broken", &secret, false);
        for (now, expected) in [(59, 1), (60, 30), (75, 15)] {
            let failure = Err(TotpError::new(TotpErrorKind::DerivationError, "Invalid secret"));
            let row = history_row(&entry, failure, now, false);
            assert_eq!(row.code, "ERROR");
            assert_eq!(row.remaining_seconds, expected, "now={}", now);
        }
    }

    #[tokio::test]
    async fn watch_start_builds_board() {
        let s = session(false);
        code(&s, "MZXW6", None, false).await.unwrap();
        let board = watch_start(&s, Some(DEMO_SECRET), None, false).await.unwrap();
        assert_eq!(board.primary.unwrap().code, "996554");
        assert_eq!(board.entries.len(), 2);
        s.shutdown().await;
    }
}
