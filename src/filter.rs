//! Notice-type filtering.

use std::collections::HashSet;

/// Filter attached to a handler registration.
///
/// Allow and deny sets are mutually exclusive; the
/// [`Registration`](crate::dispatch::Registration) builder rejects a
/// configuration naming both before any network activity.
#[derive(Clone, Debug, Default)]
pub enum FilterSpec {
    /// No filter: every notice is dispatched.
    #[default]
    Any,
    /// Dispatch only notices whose type code is in the set.
    Allow(HashSet<u32>),
    /// Drop notices whose type code is in the set.
    Deny(HashSet<u32>),
}

impl FilterSpec {
    /// Decide whether a notice with the given type code passes the filter.
    ///
    /// A notice with no extractable type code is dropped by an allow-set
    /// (membership cannot be shown) and passed by a deny-set.
    #[must_use]
    pub fn accepts(&self, notice_type: Option<u32>) -> bool {
        match self {
            Self::Any => true,
            Self::Allow(set) => notice_type.is_some_and(|code| set.contains(&code)),
            Self::Deny(set) => notice_type.is_none_or(|code| !set.contains(&code)),
        }
    }
}
