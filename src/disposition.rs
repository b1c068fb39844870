//! KOI dispositions and their fixed class-index encoding.
//!
//! The same table encodes labels at training time and decodes predictions at
//! inference time, so the two can never drift apart.

use crate::error::{KoiError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification outcome for a Kepler Object of Interest.
///
/// The discriminant is the class index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum Disposition {
    /// Spurious transit signal.
    #[serde(rename = "FALSE POSITIVE")]
    FalsePositive = 0,
    /// Confirmed planet.
    #[serde(rename = "CONFIRMED")]
    Confirmed = 1,
    /// Unresolved planet candidate.
    #[serde(rename = "CANDIDATE")]
    Candidate = 2,
}

/// Class index → disposition.
pub const DISPOSITIONS: [Disposition; 3] = [
    Disposition::FalsePositive,
    Disposition::Confirmed,
    Disposition::Candidate,
];

// Every entry sits at its own discriminant.
const _: () = {
    let mut i = 0;
    while i < DISPOSITIONS.len() {
        assert!(DISPOSITIONS[i] as usize == i);
        i += 1;
    }
};

/// Number of disposition classes.
pub const N_CLASSES: usize = DISPOSITIONS.len();

impl Disposition {
    /// Decodes a class index.
    ///
    /// # Examples
    ///
    /// ```
    /// use koi_classifier::disposition::Disposition;
    ///
    /// assert_eq!(Disposition::from_index(1), Some(Disposition::Confirmed));
    /// assert_eq!(Disposition::from_index(3), None);
    /// ```
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        DISPOSITIONS.get(index).copied()
    }

    /// Encodes this disposition as its class index.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Label as it appears in the KOI catalogue.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FalsePositive => "FALSE POSITIVE",
            Self::Confirmed => "CONFIRMED",
            Self::Candidate => "CANDIDATE",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = KoiError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        DISPOSITIONS
            .iter()
            .copied()
            .find(|d| d.as_str() == trimmed)
            .ok_or_else(|| KoiError::InvalidLabel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_index() {
        for (i, d) in DISPOSITIONS.iter().enumerate() {
            assert_eq!(d.index(), i);
            assert_eq!(Disposition::from_index(i), Some(*d));
        }
    }

    #[test]
    fn test_fixed_encoding() {
        assert_eq!(Disposition::FalsePositive.index(), 0);
        assert_eq!(Disposition::Confirmed.index(), 1);
        assert_eq!(Disposition::Candidate.index(), 2);
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(
            "FALSE POSITIVE".parse::<Disposition>().expect("known"),
            Disposition::FalsePositive
        );
        assert_eq!(
            " CANDIDATE ".parse::<Disposition>().expect("known"),
            Disposition::Candidate
        );
        assert!(matches!(
            "NOT DISPOSITIONED".parse::<Disposition>(),
            Err(KoiError::InvalidLabel(_))
        ));
    }

    #[test]
    fn test_serde_uses_catalogue_labels() {
        let json = serde_json::to_string(&Disposition::FalsePositive).expect("serialize");
        assert_eq!(json, "\"FALSE POSITIVE\"");
        let back: Disposition = serde_json::from_str("\"CONFIRMED\"").expect("deserialize");
        assert_eq!(back, Disposition::Confirmed);
    }
}
