//! BusNearby stop identifier type.

use std::fmt;

/// Namespace tag the BusNearby router expects in front of stop codes.
const STOP_NAMESPACE: &str = "1:";

/// Error returned when parsing an invalid stop identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid stop id: {reason}")]
pub struct InvalidStopId {
    reason: &'static str,
}

/// A stop (station) identifier as entered by the user, e.g. `24068`.
///
/// The identifier is kept exactly as given (after trimming) so it can be
/// shown and persisted unchanged. Use [`StopId::namespaced`] to build the
/// identifier the stop-times endpoint expects.
///
/// # Examples
///
/// ```
/// use silent_bus::domain::StopId;
///
/// let stop = StopId::parse(" 24068 ").unwrap();
/// assert_eq!(stop.as_str(), "24068");
/// assert_eq!(stop.namespaced(), "1:24068");
///
/// // Already-namespaced ids pass through unchanged
/// assert_eq!(StopId::parse("1:24068").unwrap().namespaced(), "1:24068");
///
/// // Blank input is rejected
/// assert!(StopId::parse("   ").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct StopId(String);

impl StopId {
    /// Parse a stop identifier, trimming surrounding whitespace.
    pub fn parse(s: &str) -> Result<Self, InvalidStopId> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(InvalidStopId {
                reason: "stop id cannot be empty",
            });
        }

        if trimmed.contains('/') || trimmed.chars().any(char::is_whitespace) {
            return Err(InvalidStopId {
                reason: "stop id cannot contain '/' or whitespace",
            });
        }

        Ok(StopId(trimmed.to_string()))
    }

    /// Returns the stop id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier with the router namespace applied.
    ///
    /// Idempotent: an id that already carries the prefix is returned as is.
    pub fn namespaced(&self) -> String {
        if self.0.starts_with(STOP_NAMESPACE) {
            self.0.clone()
        } else {
            format!("{STOP_NAMESPACE}{}", self.0)
        }
    }
}

impl fmt::Debug for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StopId({})", self.0)
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims() {
        let stop = StopId::parse("  24068\n").unwrap();
        assert_eq!(stop.as_str(), "24068");
    }

    #[test]
    fn reject_empty() {
        assert!(StopId::parse("").is_err());
        assert!(StopId::parse("   ").is_err());
    }

    #[test]
    fn reject_path_separators_and_inner_space() {
        assert!(StopId::parse("240/68").is_err());
        assert!(StopId::parse("240 68").is_err());
    }

    #[test]
    fn namespaced_adds_prefix() {
        assert_eq!(StopId::parse("24068").unwrap().namespaced(), "1:24068");
    }

    #[test]
    fn namespaced_keeps_existing_prefix() {
        assert_eq!(StopId::parse("1:24068").unwrap().namespaced(), "1:24068");
    }

    #[test]
    fn display_and_debug() {
        let stop = StopId::parse("3600").unwrap();
        assert_eq!(format!("{}", stop), "3600");
        assert_eq!(format!("{:?}", stop), "StopId(3600)");
    }
}
