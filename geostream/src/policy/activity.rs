//! Activity type hint.

use std::fmt;

/// The kind of motion a location request is tracking.
///
/// A pure hint to the hardware layer (e.g. pause detection, filtering).
/// Ordered by how demanding the activity is for the sensor session, so the
/// session profile can aggregate the most demanding one across requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActivityType {
    /// Unspecified or mixed motion.
    #[default]
    Other,
    /// Walking, running, cycling.
    Fitness,
    /// Road vehicle motion.
    Automotive,
    /// Turn-by-turn navigation; the most demanding profile.
    Navigation,
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_other() {
        assert_eq!(ActivityType::default(), ActivityType::Other);
    }

    #[test]
    fn test_ordering_by_demand() {
        assert!(ActivityType::Other < ActivityType::Fitness);
        assert!(ActivityType::Fitness < ActivityType::Automotive);
        assert!(ActivityType::Automotive < ActivityType::Navigation);
    }
}
