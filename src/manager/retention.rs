// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Clone retention policy.
//!
//! A __retention policy__ caps how many clones a manager keeps around. Clones
//! are counted relative to the active clone: __older__ clones were created
//! before it, __newer__ clones after it, and the __total__ includes the active
//! clone itself. Each cap is optional.
//!
//! Policies are enforced in one of two ways. Either an operation is rejected
//! up front when it would leave the manager over a cap, or the manager evicts
//! clones oldest first until every cap holds again.

use crate::manager::{Error, Result};

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Caps on the number of clones to keep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of clones older than the active clone.
    pub max_older: Option<usize>,

    /// Maximum number of clones newer than the active clone.
    pub max_newer: Option<usize>,

    /// Maximum number of clones overall.
    pub max_total: Option<usize>,
}

impl RetentionPolicy {
    /// Construct policy without any caps.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Check if no cap is set.
    pub fn is_unbounded(&self) -> bool {
        self.max_older.is_none() && self.max_newer.is_none() && self.max_total.is_none()
    }

    /// Layer another policy on top, preferring its caps where set.
    pub fn overridden_by(self, other: Self) -> Self {
        Self {
            max_older: other.max_older.or(self.max_older),
            max_newer: other.max_newer.or(self.max_newer),
            max_total: other.max_total.or(self.max_total),
        }
    }

    /// Reject clone counts that exceed any cap.
    ///
    /// Caps are checked in order older, newer, total, and the first one
    /// exceeded is reported.
    ///
    /// # Errors
    ///
    /// - Return [`Error::PolicyViolation`] if a cap would be exceeded.
    pub fn check(&self, counts: CloneCounts) -> Result<()> {
        let caps = [
            (Limit::Older, self.max_older, counts.older),
            (Limit::Newer, self.max_newer, counts.newer),
            (Limit::Total, self.max_total, counts.total),
        ];

        for (limit, max, current) in caps {
            if let Some(max) = max {
                if current > max {
                    return Err(Error::PolicyViolation {
                        limit,
                        current,
                        max,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Clone counts relative to the active clone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CloneCounts {
    pub older: usize,
    pub newer: usize,
    pub total: usize,
}

/// Kind of retention cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Older,
    Newer,
    Total,
}

impl Display for Limit {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Older => fmt.write_str("older"),
            Self::Newer => fmt.write_str("newer"),
            Self::Total => fmt.write_str("total"),
        }
    }
}
