//! Platform authorization levels.

use std::fmt;

/// Permission level a request needs from the platform, ordered from none
/// to strongest. The session manager aggregates the maximum across all
/// active requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Authorization {
    /// No location permission required (heading, IP lookup).
    #[default]
    None,
    /// Location access while the app is in active use.
    WhenInUse,
    /// Location access at any time, including in the background.
    Always,
}

impl fmt::Display for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
