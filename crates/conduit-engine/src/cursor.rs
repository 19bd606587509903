// SPDX-FileCopyrightText: 2026 Conduit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resumable cursor over the session's source-id range.

use conduit_core::types::span;
use conduit_core::{ConduitError, ForwardSession, SourceId};

/// Result of asking the cursor for the next id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Next(SourceId),
    RangeExhausted,
    /// Open-ended range has caught up with the known end of the feed.
    NeedsHorizon,
}

/// Tracks the next source id to process within `[from_id, to_id]`.
///
/// The cursor only moves through [`complete`](Self::complete), which the
/// engine calls once the id has a terminal ledger entry.
#[derive(Debug, Clone)]
pub struct CursorManager {
    session_id: String,
    from_id: SourceId,
    to_id: Option<SourceId>,
    current: SourceId,
    /// Latest id the platform reported for an open-ended range.
    horizon: Option<SourceId>,
}

impl CursorManager {
    /// Resume from the persisted cursor, rejecting checkpoints outside the range.
    pub fn from_session(session: &ForwardSession) -> Result<Self, ConduitError> {
        session.check_cursor()?;
        Ok(Self {
            session_id: session.id.clone(),
            from_id: session.from_id,
            to_id: session.to_id,
            current: session.current_id,
            horizon: None,
        })
    }

    pub fn advance(&self) -> Advance {
        match (self.to_id, self.horizon) {
            (Some(to), _) if self.current > to => Advance::RangeExhausted,
            (Some(_), _) => Advance::Next(self.current),
            (None, Some(h)) if self.current <= h => Advance::Next(self.current),
            (None, _) => Advance::NeedsHorizon,
        }
    }

    /// Record the feed's latest id. A horizon that does not reach the cursor
    /// means the open range is exhausted.
    pub fn set_horizon(&mut self, latest: Option<SourceId>) -> Advance {
        self.horizon = latest;
        match self.advance() {
            Advance::NeedsHorizon => Advance::RangeExhausted,
            other => other,
        }
    }

    /// Move past `id`. Only the current id may be completed.
    pub fn complete(&mut self, id: SourceId) -> Result<(), ConduitError> {
        if id != self.current {
            return Err(ConduitError::Internal(format!(
                "session {}: completed id {id} but cursor is at {}",
                self.session_id, self.current
            )));
        }
        self.current = self.current.checked_add(1).ok_or_else(|| {
            ConduitError::Internal(format!(
                "session {}: cursor cannot move past id {id}",
                self.session_id
            ))
        })?;
        Ok(())
    }

    pub fn current(&self) -> SourceId {
        self.current
    }

    /// Ids left in the range; for an open range, up to the known horizon.
    pub fn remaining(&self) -> Option<u64> {
        self.to_id
            .or(self.horizon)
            .map(|end| span(self.current, end))
    }

    pub fn percentage(&self) -> Option<f64> {
        let to = self.to_id?;
        let total = span(self.from_id, to) as f64;
        let done = (i128::from(self.current) - i128::from(self.from_id)) as f64;
        Some((done / total * 100.0).clamp(0.0, 100.0))
    }
}

#[cfg(test)]
mod tests {
    use conduit_core::SessionStatus;

    use super::*;

    fn session(from: i64, to: Option<i64>, current: i64) -> ForwardSession {
        ForwardSession {
            id: "s".into(),
            source_chat: "@a".into(),
            target_chat: "@b".into(),
            from_id: from,
            to_id: to,
            current_id: current,
            status: SessionStatus::Running,
            last_error: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn bounded_range_walks_to_exhaustion() {
        let mut c = CursorManager::from_session(&session(3, Some(5), 3)).unwrap();
        let mut seen = Vec::new();
        while let Advance::Next(id) = c.advance() {
            seen.push(id);
            c.complete(id).unwrap();
        }
        assert_eq!(seen, vec![3, 4, 5]);
        assert_eq!(c.advance(), Advance::RangeExhausted);
        assert_eq!(c.percentage(), Some(100.0));
        assert_eq!(c.remaining(), Some(0));
    }

    #[test]
    fn resumes_from_checkpoint() {
        let c = CursorManager::from_session(&session(1, Some(10), 5)).unwrap();
        assert_eq!(c.advance(), Advance::Next(5));
        assert_eq!(c.percentage(), Some(40.0));
    }

    #[test]
    fn corrupt_checkpoint_is_rejected() {
        let err = CursorManager::from_session(&session(10, Some(20), 2)).unwrap_err();
        assert!(matches!(err, ConduitError::CorruptCheckpoint { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn out_of_order_completion_is_refused() {
        let mut c = CursorManager::from_session(&session(1, Some(10), 1)).unwrap();
        assert!(c.complete(2).is_err());
        assert_eq!(c.current(), 1);
    }

    #[test]
    fn open_range_uses_horizon() {
        let mut c = CursorManager::from_session(&session(7, None, 7)).unwrap();
        assert_eq!(c.advance(), Advance::NeedsHorizon);
        assert_eq!(c.percentage(), None);

        assert_eq!(c.set_horizon(Some(8)), Advance::Next(7));
        c.complete(7).unwrap();
        c.complete(8).unwrap();
        assert_eq!(c.advance(), Advance::NeedsHorizon);
        assert_eq!(c.set_horizon(Some(8)), Advance::RangeExhausted);
        assert_eq!(c.set_horizon(None), Advance::RangeExhausted);
    }

    #[test]
    fn horizon_at_largest_id_does_not_overflow() {
        let mut c = CursorManager::from_session(&session(i64::MAX - 1, None, i64::MAX - 1)).unwrap();
        assert_eq!(c.set_horizon(Some(i64::MAX)), Advance::Next(i64::MAX - 1));
        assert_eq!(c.remaining(), Some(2));
        c.complete(i64::MAX - 1).unwrap();
        assert_eq!(c.remaining(), Some(1));
        assert!(c.complete(i64::MAX).is_err());
        assert_eq!(c.current(), i64::MAX);
    }
}
