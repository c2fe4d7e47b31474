//! Structural diff between two program snapshots
//!
//! Finds the first statement at which a new snapshot stops matching the one
//! that was executed before, and derives what the session has to do about it.

/// Result of comparing two statement sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffPoint {
    /// Same statements, same length
    Unchanged,
    /// First differing index (0 when there is no previous snapshot)
    At(usize),
}

impl DiffPoint {
    pub fn index(self) -> Option<usize> {
        match self {
            DiffPoint::Unchanged => None,
            DiffPoint::At(i) => Some(i),
        }
    }
}

/// Compare `previous` against `next` positionally
///
/// A missing previous sequence means the program is wholly different.
/// When one sequence is a prefix of the other, the diff point is the
/// length of the shorter one.
pub fn diff_point<U: PartialEq>(previous: Option<&[U]>, next: &[U]) -> DiffPoint {
    let Some(previous) = previous else {
        return DiffPoint::At(0);
    };

    let common = previous.len().min(next.len());
    if let Some(i) = (0..common).find(|&i| previous[i] != next[i]) {
        return DiffPoint::At(i);
    }

    if previous.len() == next.len() {
        DiffPoint::Unchanged
    } else {
        DiffPoint::At(common)
    }
}

/// What the session must do after a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Nothing changed; keep the previous snapshot and the whole cache
    Keep,
    /// Adopt the new snapshot, truncate the cache to `cache_len`, keep the session
    Resume { cache_len: usize },
    /// The evaluated prefix changed: truncate and reset before evaluating again
    Reset { cache_len: usize },
}

/// Apply the invalidation policy for a diff point given the session cursor
pub fn plan(point: DiffPoint, cursor: usize) -> SessionAction {
    match point {
        DiffPoint::Unchanged => SessionAction::Keep,
        DiffPoint::At(i) if i < cursor => SessionAction::Reset { cache_len: i },
        DiffPoint::At(i) => SessionAction::Resume { cache_len: i },
    }
}
