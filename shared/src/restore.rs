//! Request lifecycle for calls that may hit an asynchronous restore.
//!
//! Formplayer answers `status: "retry"` while it is still building the user's
//! restore. The client waits the advertised number of seconds and asks again,
//! showing progress meanwhile. Each navigation owns a [`RequestTicket`]; any
//! reply or timer carrying an older ticket belongs to a superseded navigation
//! and is dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::{AppError, ErrorKind, DEFAULT_RETRY_DELAY, MAX_RETRY_DELAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestTicket(pub u64);

impl fmt::Display for RequestTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Independent request lanes. The menu region, the case-detail modal and the
/// sync button each track their own in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Menu,
    Detail,
    Sync,
}

/// Hands out strictly increasing tickets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketIssuer {
    last: u64,
}

impl TicketIssuer {
    pub fn next_ticket(&mut self) -> RequestTicket {
        self.last += 1;
        RequestTicket(self.last)
    }

    #[must_use]
    pub const fn last(&self) -> Option<RequestTicket> {
        if self.last == 0 {
            None
        } else {
            Some(RequestTicket(self.last))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// `None` retries for as long as the server keeps asking.
    pub max_retries: Option<u32>,
    pub default_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            default_delay_ms: duration_ms(DEFAULT_RETRY_DELAY),
            max_delay_ms: duration_ms(MAX_RETRY_DELAY),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Fixed delay taken from the server, falling back to the default when
    /// the hint is missing or not positive.
    #[must_use]
    pub fn delay_for(&self, retry_after_secs: Option<f64>) -> Duration {
        let ms = match retry_after_secs {
            Some(secs) if secs.is_finite() && secs > 0.0 => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let ms = (secs * 1000.0).round() as u64;
                ms
            }
            _ => self.default_delay_ms,
        };
        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    #[must_use]
    pub fn allows(&self, retries_so_far: u32) -> bool {
        self.max_retries.map_or(true, |max| retries_so_far < max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreProgress {
    pub done: u64,
    pub total: u64,
}

impl RestoreProgress {
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let pct = self.done.min(self.total).saturating_mul(100) / self.total;
        u8::try_from(pct).unwrap_or(100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    #[error("ticket {got} is stale (current: {current:?})")]
    Stale {
        got: RequestTicket,
        current: Option<RequestTicket>,
    },
    #[error("gave up after {attempts} retries")]
    RetryLimitExceeded { attempts: u32 },
    #[error("cannot {event} while {state}")]
    UnexpectedTransition {
        state: &'static str,
        event: &'static str,
    },
}

impl RestoreError {
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

impl From<RestoreError> for AppError {
    fn from(e: RestoreError) -> Self {
        match e {
            RestoreError::RetryLimitExceeded { attempts } => {
                AppError::new(ErrorKind::RetryLimitExceeded, e.to_string())
                    .with_context("attempts", attempts.to_string())
            }
            RestoreError::Stale { .. } | RestoreError::UnexpectedTransition { .. } => {
                AppError::new(ErrorKind::InvalidState, e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RestoreStatus {
    #[default]
    Idle,
    /// `progress` carries the last reported progress through a retry so the
    /// progress region stays up until a terminal reply.
    Requesting {
        ticket: RequestTicket,
        attempt: u32,
        progress: Option<RestoreProgress>,
    },
    WaitingToRetry {
        ticket: RequestTicket,
        attempt: u32,
        retry_after_ms: u64,
        progress: RestoreProgress,
    },
    Done {
        ticket: RequestTicket,
    },
    Failed {
        ticket: RequestTicket,
        error: AppError,
    },
}

impl RestoreStatus {
    #[must_use]
    pub const fn start(ticket: RequestTicket) -> Self {
        Self::Requesting {
            ticket,
            attempt: 0,
            progress: None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting { .. } => "requesting",
            Self::WaitingToRetry { .. } => "waiting_to_retry",
            Self::Done { .. } => "done",
            Self::Failed { .. } => "failed",
        }
    }

    #[must_use]
    pub const fn ticket(&self) -> Option<RequestTicket> {
        match self {
            Self::Idle => None,
            Self::Requesting { ticket, .. }
            | Self::WaitingToRetry { ticket, .. }
            | Self::Done { ticket }
            | Self::Failed { ticket, .. } => Some(*ticket),
        }
    }

    #[must_use]
    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.ticket() == Some(ticket)
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Requesting { .. } | Self::WaitingToRetry { .. })
    }

    #[must_use]
    pub const fn progress(&self) -> Option<RestoreProgress> {
        match self {
            Self::WaitingToRetry { progress, .. } => Some(*progress),
            Self::Requesting { progress, .. } => *progress,
            _ => None,
        }
    }

    fn guard(&self, ticket: RequestTicket) -> Result<(), RestoreError> {
        if self.is_current(ticket) {
            Ok(())
        } else {
            Err(RestoreError::Stale {
                got: ticket,
                current: self.ticket(),
            })
        }
    }

    /// Server said "not yet". Returns the delay to wait before asking again.
    pub fn on_retry(
        &mut self,
        ticket: RequestTicket,
        retry_after_secs: Option<f64>,
        progress: RestoreProgress,
        policy: &RetryPolicy,
    ) -> Result<Duration, RestoreError> {
        self.guard(ticket)?;
        let Self::Requesting { attempt, .. } = *self else {
            return Err(RestoreError::UnexpectedTransition {
                state: self.name(),
                event: "schedule a retry",
            });
        };

        if !policy.allows(attempt) {
            let error = RestoreError::RetryLimitExceeded { attempts: attempt };
            *self = Self::Failed {
                ticket,
                error: error.clone().into(),
            };
            return Err(error);
        }

        let delay = policy.delay_for(retry_after_secs);
        *self = Self::WaitingToRetry {
            ticket,
            attempt,
            retry_after_ms: duration_ms(delay),
            progress,
        };
        Ok(delay)
    }

    /// Retry timer elapsed. Returns the number of the retry about to go out.
    pub fn on_timer_fired(&mut self, ticket: RequestTicket) -> Result<u32, RestoreError> {
        self.guard(ticket)?;
        let Self::WaitingToRetry {
            attempt, progress, ..
        } = *self
        else {
            return Err(RestoreError::UnexpectedTransition {
                state: self.name(),
                event: "fire a retry",
            });
        };
        let attempt = attempt + 1;
        *self = Self::Requesting {
            ticket,
            attempt,
            progress: Some(progress),
        };
        Ok(attempt)
    }

    pub fn on_success(&mut self, ticket: RequestTicket) -> Result<(), RestoreError> {
        self.guard(ticket)?;
        if !matches!(self, Self::Requesting { .. }) {
            return Err(RestoreError::UnexpectedTransition {
                state: self.name(),
                event: "complete",
            });
        }
        *self = Self::Done { ticket };
        Ok(())
    }

    pub fn on_failure(&mut self, ticket: RequestTicket, error: AppError) -> Result<(), RestoreError> {
        self.guard(ticket)?;
        *self = Self::Failed { ticket, error };
        Ok(())
    }

    /// Soft cancel. Whatever is still in flight will be discarded on arrival.
    pub fn cancel(&mut self) {
        *self = Self::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const T1: RequestTicket = RequestTicket(1);
    const T2: RequestTicket = RequestTicket(2);

    fn progress(done: u64, total: u64) -> RestoreProgress {
        RestoreProgress { done, total }
    }

    #[test]
    fn test_tickets_increase() {
        let mut issuer = TicketIssuer::default();
        assert_eq!(issuer.last(), None);
        let a = issuer.next_ticket();
        let b = issuer.next_ticket();
        assert!(b > a);
        assert_eq!(issuer.last(), Some(b));
    }

    #[test]
    fn test_delay_uses_server_hint() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(Some(30.0)), Duration::from_secs(30));
        assert_eq!(policy.delay_for(Some(0.5)), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_falls_back_and_clamps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(None), Duration::from_secs(5));
        assert_eq!(policy.delay_for(Some(0.0)), Duration::from_secs(5));
        assert_eq!(policy.delay_for(Some(-3.0)), Duration::from_secs(5));
        assert_eq!(policy.delay_for(Some(f64::NAN)), Duration::from_secs(5));
        assert_eq!(policy.delay_for(Some(10_000.0)), Duration::from_secs(300));
    }

    #[test]
    fn test_full_retry_cycle() {
        let policy = RetryPolicy::default();
        let mut status = RestoreStatus::start(T1);

        let delay = status.on_retry(T1, Some(30.0), progress(9, 30), &policy).unwrap();
        assert_eq!(delay, Duration::from_secs(30));
        assert_eq!(status.progress(), Some(progress(9, 30)));
        assert!(status.is_in_flight());

        assert_eq!(status.on_timer_fired(T1), Ok(1));
        assert_eq!(status.progress(), Some(progress(9, 30)));

        status.on_success(T1).unwrap();
        assert_eq!(status, RestoreStatus::Done { ticket: T1 });
        assert_eq!(status.progress(), None);
        assert!(!status.is_in_flight());
    }

    #[test]
    fn test_stale_ticket_is_rejected_everywhere() {
        let policy = RetryPolicy::default();
        let mut status = RestoreStatus::start(T2);

        assert_matches!(status.on_success(T1), Err(RestoreError::Stale { .. }));
        assert_matches!(
            status.on_retry(T1, None, progress(0, 1), &policy),
            Err(e) if e.is_stale()
        );
        assert_matches!(status.on_timer_fired(T1), Err(RestoreError::Stale { .. }));
        assert_matches!(
            status.on_failure(T1, AppError::new(ErrorKind::Server, "x")),
            Err(RestoreError::Stale { .. })
        );
        assert_eq!(status, RestoreStatus::start(T2));
    }

    #[test]
    fn test_cancelled_status_rejects_everything() {
        let mut status = RestoreStatus::start(T1);
        status.cancel();
        assert_matches!(
            status.on_success(T1),
            Err(RestoreError::Stale { current: None, .. })
        );
    }

    #[test]
    fn test_retry_ceiling() {
        let policy = RetryPolicy::default().with_max_retries(1);
        let mut status = RestoreStatus::start(T1);

        status.on_retry(T1, Some(1.0), progress(1, 3), &policy).unwrap();
        status.on_timer_fired(T1).unwrap();

        let err = status
            .on_retry(T1, Some(1.0), progress(2, 3), &policy)
            .unwrap_err();
        assert_eq!(err, RestoreError::RetryLimitExceeded { attempts: 1 });
        assert_matches!(
            status,
            RestoreStatus::Failed { ref error, .. } if error.kind == ErrorKind::RetryLimitExceeded
        );
    }

    #[test]
    fn test_no_ceiling_by_default() {
        let policy = RetryPolicy::default();
        let mut status = RestoreStatus::start(T1);
        for expected in 1..=50 {
            status.on_retry(T1, Some(1.0), progress(0, 1), &policy).unwrap();
            assert_eq!(status.on_timer_fired(T1), Ok(expected));
        }
    }

    #[test]
    fn test_timer_without_pending_retry() {
        let mut status = RestoreStatus::start(T1);
        assert_matches!(
            status.on_timer_fired(T1),
            Err(RestoreError::UnexpectedTransition { state: "requesting", .. })
        );
    }

    #[test]
    fn test_success_while_waiting_is_unexpected() {
        let mut status = RestoreStatus::start(T1);
        status
            .on_retry(T1, None, progress(0, 1), &RetryPolicy::default())
            .unwrap();
        assert_matches!(
            status.on_success(T1),
            Err(RestoreError::UnexpectedTransition { .. })
        );
    }

    #[test]
    fn test_progress_survives_retry_until_failure() {
        let mut status = RestoreStatus::start(T1);
        assert_eq!(status.progress(), None);

        status
            .on_retry(T1, Some(1.0), progress(2, 4), &RetryPolicy::default())
            .unwrap();
        status.on_timer_fired(T1).unwrap();
        assert_matches!(
            status,
            RestoreStatus::Requesting { attempt: 1, progress: Some(p), .. } if p == progress(2, 4)
        );

        status
            .on_failure(T1, AppError::new(ErrorKind::Server, "x"))
            .unwrap();
        assert_eq!(status.progress(), None);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress(9, 30).percent(), 30);
        assert_eq!(progress(0, 0).percent(), 0);
        assert_eq!(progress(40, 30).percent(), 100);
    }
}
