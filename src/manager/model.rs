// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use chrono::{DateTime, Utc};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Identifier of a clone.
///
/// Always rendered as 8 lowercase hexadecimal digits, zero padded. Because
/// identifiers are assigned in increasing order, the lexicographic order of
/// their rendering is also their creation order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CloneId(u32);

impl CloneId {
    /// Identifier of the root clone.
    pub const ROOT: Self = Self(0);

    /// Construct new clone identifier.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Numeric value of identifier.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Identifier that follows this one, if the identifier space allows it.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl Display for CloneId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{:08x}", self.0)
    }
}

impl FromStr for CloneId {
    type Err = InvalidCloneId;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let well_formed = data.len() == 8
            && data
                .bytes()
                .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
        if !well_formed {
            return Err(InvalidCloneId(data.to_owned()));
        }

        u32::from_str_radix(data, 16)
            .map(Self)
            .map_err(|_| InvalidCloneId(data.to_owned()))
    }
}

/// Clone identifier is not 8 lowercase hexadecimal digits.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not an 8 digit lowercase hexadecimal clone id")]
pub struct InvalidCloneId(pub String);

/// One version in the clone chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneEntry {
    /// Identifier of the clone.
    pub id: CloneId,

    /// Backend dataset holding the clone.
    pub backend_id: String,

    /// Snapshot the clone was created from.
    pub origin: Option<String>,

    /// Clone that owns the origin snapshot, if it is part of the same tree.
    pub origin_id: Option<CloneId>,

    /// Current mountpoint.
    pub mountpoint: Option<PathBuf>,

    /// Whether the clone is currently mounted.
    pub mounted: bool,

    /// Creation time in seconds since the Unix epoch.
    pub created_at: i64,

    /// Space consumed by the clone.
    pub used_bytes: u64,
}

impl CloneEntry {
    /// Creation time as a date.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created_at, 0)
    }
}
