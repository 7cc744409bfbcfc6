//! History selections typed on the command line
//!
//! `"3"` picks the newest three entries, `"2-4"` picks positions two
//! through four of the newest-first listing, and `"1,3,5"` picks those
//! positions. Positions are 1-based.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("invalid selection '{0}': expected N, A-B or A,B,C")]
    Invalid(String),

    #[error("invalid range '{0}': start is after end")]
    Reversed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The newest N entries.
    Last(usize),
    /// Positions `start..=end` in the newest-first listing.
    Range { start: usize, end: usize },
    /// Positions in the newest-first listing.
    Positions(Vec<usize>),
}

impl Selection {
    /// How many of the newest ids are needed to resolve this selection.
    pub fn depth(&self) -> usize {
        match self {
            Selection::Last(count) => *count,
            Selection::Range { end, .. } => *end,
            Selection::Positions(positions) => positions.iter().copied().max().unwrap_or(0),
        }
    }

    /// Map the selection onto `recent` (newest first) and return the
    /// chosen ids oldest first. Out-of-range positions are skipped.
    pub fn resolve(&self, recent: &[i64]) -> Vec<i64> {
        let mut ids: Vec<i64> = match self {
            Selection::Last(count) => recent.iter().take(*count).copied().collect(),
            Selection::Range { start, end } => {
                let first = (*start).max(1);
                let last = (*end).min(recent.len());
                if first > last {
                    Vec::new()
                } else {
                    recent[first - 1..last].to_vec()
                }
            }
            Selection::Positions(positions) => positions
                .iter()
                .filter(|&&p| p >= 1 && p <= recent.len())
                .map(|&p| recent[p - 1])
                .collect(),
        };
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl FromStr for Selection {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SelectionError::Invalid(s.to_string());
        let number = |part: &str| part.trim().parse::<usize>().map_err(|_| invalid());

        let s_trimmed = s.trim();
        if s_trimmed.contains(',') {
            let positions = s_trimmed
                .split(',')
                .map(number)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Selection::Positions(positions))
        } else if let Some((start, end)) = s_trimmed.split_once('-') {
            let (start, end) = (number(start)?, number(end)?);
            if start > end {
                return Err(SelectionError::Reversed(s.to_string()));
            }
            Ok(Selection::Range { start, end })
        } else {
            Ok(Selection::Last(number(s_trimmed)?))
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Last(count) => write!(f, "{}", count),
            Selection::Range { start, end } => write!(f, "{}-{}", start, end),
            Selection::Positions(positions) => {
                let parts: Vec<String> = positions.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}
