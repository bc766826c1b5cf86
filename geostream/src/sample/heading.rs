//! Orientation samples.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// A single compass reading reported by the sample source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingSample {
    /// Heading relative to true north in degrees (0-360).
    pub true_heading: f64,
    /// Heading relative to magnetic north in degrees (0-360).
    pub magnetic_heading: f64,
    /// Maximum deviation between reported and actual heading, in degrees.
    /// Negative means the reading is invalid.
    pub accuracy: f64,
    /// Wall-clock time of the reading.
    pub timestamp: SystemTime,
}

impl HeadingSample {
    /// Creates a heading sample with equal true and magnetic headings,
    /// timestamped now.
    pub fn new(true_heading: f64) -> Self {
        Self {
            true_heading,
            magnetic_heading: true_heading,
            accuracy: 0.0,
            timestamp: SystemTime::now(),
        }
    }

    /// Creates a heading sample with distinct true and magnetic headings.
    pub fn with_magnetic(true_heading: f64, magnetic_heading: f64) -> Self {
        Self {
            true_heading,
            magnetic_heading,
            accuracy: 0.0,
            timestamp: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_both_headings() {
        let h = HeadingSample::new(270.0);
        assert_eq!(h.true_heading, 270.0);
        assert_eq!(h.magnetic_heading, 270.0);
    }

    #[test]
    fn test_with_magnetic_keeps_declination() {
        let h = HeadingSample::with_magnetic(100.0, 102.5);
        assert_eq!(h.true_heading, 100.0);
        assert_eq!(h.magnetic_heading, 102.5);
    }
}
