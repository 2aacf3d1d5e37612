//! Timed override that suspends blocking.
//!
//! The controller has two states, active (blocking enforced) and paused.
//! A pause request opens a session of fixed length; there is no explicit
//! resume. Expiry is resolved lazily by [`PauseController::status`], which
//! every caller goes through, so nobody observes a session past its end.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use crate::stats::StatsLedger;

/// Default length of a pause session.
pub const DEFAULT_PAUSE_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Observable pause state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseStatus {
    /// Blocking is enforced.
    Active,
    /// All queries pass through until `until`.
    Paused { until: DateTime<Utc> },
}

impl PauseStatus {
    pub const fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    pub const fn until(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active => None,
            Self::Paused { until } => Some(*until),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Session {
    /// Wall-clock end reported to clients.
    until: DateTime<Utc>,
    /// Monotonic end used for expiry; `None` when the window does not fit
    /// in an `Instant`, so the session never expires.
    deadline: Option<Instant>,
}

impl Session {
    fn is_over(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Shared pause state machine.
///
/// Session starts and ends are mirrored into the [`StatsLedger`] under the
/// controller's write lock, so pause accounting cannot drift from the
/// observable state.
#[derive(Debug)]
pub struct PauseController {
    session: RwLock<Option<Session>>,
    ledger: Arc<StatsLedger>,
    window: Duration,
}

impl PauseController {
    pub fn new(ledger: Arc<StatsLedger>) -> Self {
        Self::with_window(ledger, DEFAULT_PAUSE_WINDOW)
    }

    pub fn with_window(ledger: Arc<StatsLedger>, window: Duration) -> Self {
        Self {
            session: RwLock::new(None),
            ledger,
            window,
        }
    }

    /// Current state, ending an expired session first.
    pub fn status(&self) -> PauseStatus {
        let now = Instant::now();
        match *self.session.read() {
            None => return PauseStatus::Active,
            Some(session) if !session.is_over(now) => {
                return PauseStatus::Paused {
                    until: session.until,
                };
            }
            Some(_) => {}
        }

        let mut session = self.session.write();
        self.expire(&mut session, now);
        match *session {
            Some(open) => PauseStatus::Paused { until: open.until },
            None => PauseStatus::Active,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.status().is_paused()
    }

    pub fn pause_until(&self) -> Option<DateTime<Utc>> {
        self.status().until()
    }

    /// Suspend blocking for one window and return when it ends.
    ///
    /// While a session is open this is a no-op returning the open session's
    /// end; the window is never extended.
    pub fn pause(&self) -> DateTime<Utc> {
        let now = Instant::now();
        let mut session = self.session.write();
        self.expire(&mut session, now);

        if let Some(open) = *session {
            return open.until;
        }

        let until = chrono::Duration::from_std(self.window)
            .ok()
            .and_then(|window| Utc::now().checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        *session = Some(Session {
            until,
            deadline: now.checked_add(self.window),
        });
        self.ledger.start_pause();
        crate::metrics::record_pause();
        info!(until = %until.to_rfc3339(), "blocking paused");
        until
    }

    fn expire(&self, session: &mut Option<Session>, now: Instant) {
        if session.is_some_and(|open| open.is_over(now)) {
            *session = None;
            self.ledger.end_pause();
            info!("blocking resumed");
        }
    }
}
