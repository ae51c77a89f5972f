//! License plate validation and extraction from raw OCR text
//!
//! Plates are 7 characters in the national format `LLLDDDL`
//! (3 uppercase letters, 3 digits, 1 uppercase letter) and always
//! begin with the series marker (e.g. "RAB123C" in the "RA" series).
//! OCR output is noisy; `extract` locates the marker inside arbitrary
//! text and validates the 7 characters starting there.

use serde::{Deserialize, Serialize};

/// Default series marker for plates in circulation
pub const DEFAULT_PLATE_MARKER: &str = "RA";

/// Exact plate length after extraction
pub const PLATE_LEN: usize = 7;

/// Validated license plate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plate(String);

impl Plate {
    /// Validate an exact plate string: 7 chars, `LLLDDDL`
    pub fn parse(text: &str) -> Option<Plate> {
        let bytes = text.as_bytes();
        if bytes.len() != PLATE_LEN {
            return None;
        }

        let prefix_ok = bytes[..3].iter().all(|b| b.is_ascii_uppercase());
        let digits_ok = bytes[3..6].iter().all(|b| b.is_ascii_digit());
        let suffix_ok = bytes[6].is_ascii_uppercase();

        if prefix_ok && digits_ok && suffix_ok {
            Some(Plate(text.to_string()))
        } else {
            None
        }
    }

    /// Extract a plate from raw OCR text.
    ///
    /// Finds the series marker, takes 7 bytes from the marker inclusive,
    /// and validates them. Returns `None` if the marker is absent, the
    /// tail is too short or cut inside a multibyte character, or the
    /// format check fails.
    pub fn extract(raw: &str, marker: &str) -> Option<Plate> {
        let start = raw.find(marker)?;
        let tail = raw[start..].get(..PLATE_LEN)?;
        Self::parse(tail)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Plate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
