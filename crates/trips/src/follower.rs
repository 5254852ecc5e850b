//! # Path Follower
//!
//! Walks a marker along a precomputed path, one point per tick.
//!
//! ```text
//! Idle --start--> Following --last point--> Completed --reset--> Idle
//! ```
//!
//! A tick is a no-op while the booking's scheduled start lies in the future.
//! The index never moves backwards and never leaves `0..path.len()`.

use chrono::{DateTime, Utc};

use crate::models::Coordinate;

/// Where the follower is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Following,
    Completed,
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing to follow.
    Idle,
    /// Scheduled start not yet reached.
    Waiting { starts_at: DateTime<Utc> },
    /// Moved one point forward.
    Advanced { index: usize },
    /// Moved onto the last point. Reported exactly once per trip.
    Arrived { index: usize },
    /// Already at the last point.
    Finished,
}

impl Step {
    /// The index changed and should be persisted.
    #[must_use]
    pub const fn moved(self) -> Option<usize> {
        match self {
            Self::Advanced { index } | Self::Arrived { index } => Some(index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathFollower {
    path: Vec<Coordinate>,
    index: usize,
    starts_at: Option<DateTime<Utc>>,
}

impl PathFollower {
    #[must_use]
    pub const fn idle() -> Self {
        Self { path: Vec::new(), index: 0, starts_at: None }
    }

    /// Follow `path` from `index`, clamped to the last point.
    #[must_use]
    pub fn resume(path: Vec<Coordinate>, index: usize, starts_at: Option<DateTime<Utc>>) -> Self {
        let index = index.min(path.len().saturating_sub(1));
        Self { path, index, starts_at }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.path.is_empty() {
            Phase::Idle
        } else if self.index + 1 >= self.path.len() {
            Phase::Completed
        } else {
            Phase::Following
        }
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Number of points on the path being followed.
    #[must_use]
    pub const fn path_len(&self) -> usize {
        self.path.len()
    }

    #[must_use]
    pub fn position(&self) -> Option<Coordinate> {
        self.path.get(self.index).copied()
    }

    /// Advance by one point unless gated, idle, or already at the end.
    pub fn step(&mut self, now: DateTime<Utc>) -> Step {
        match self.phase() {
            Phase::Idle => return Step::Idle,
            Phase::Completed => return Step::Finished,
            Phase::Following => {}
        }
        if let Some(starts_at) = self.starts_at
            && starts_at > now
        {
            return Step::Waiting { starts_at };
        }

        self.index += 1;
        if self.phase() == Phase::Completed {
            Step::Arrived { index: self.index }
        } else {
            Step::Advanced { index: self.index }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::idle();
    }
}
