//! What a coordinator monitors: a stop with line filters, or a rail route.

use std::fmt;

use super::StopId;
use super::arrival::ROUTE_KEY;

/// Error returned when a line list has no usable entries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("at least one line must be given")]
pub struct EmptyLineSet;

/// An ordered set of line numbers.
///
/// Lines are unique and keep the order they were first given in, so sensors
/// appear in the order the user typed them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LineSet(Vec<String>);

impl LineSet {
    /// An empty set, meaning "no filtering".
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse comma-separated user input such as `"249, 40,605"`.
    ///
    /// Entries are trimmed, blanks are dropped, and duplicates keep their
    /// first position.
    pub fn parse(input: &str) -> Result<Self, EmptyLineSet> {
        let set: LineSet = input.split(',').collect();
        if set.is_empty() {
            return Err(EmptyLineSet);
        }
        Ok(set)
    }

    /// Add a line, ignoring blanks and duplicates.
    pub fn insert(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() || self.contains(line) {
            return false;
        }
        self.0.push(line.to_string());
        true
    }

    /// Set-membership test used for filtering upstream results.
    pub fn contains(&self, line: &str) -> bool {
        self.0.iter().any(|l| l == line)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl<S: AsRef<str>> FromIterator<S> for LineSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = LineSet::new();
        for line in iter {
            set.insert(line.as_ref());
        }
        set
    }
}

impl fmt::Debug for LineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl fmt::Display for LineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// A single station watched for a set of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTarget {
    pub stop_id: StopId,
    pub name: String,
    pub lines: LineSet,
    /// Upcoming arrivals requested per line.
    pub max_arrivals: u32,
}

/// An origin/destination pair for rail itineraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub origin: StopId,
    pub destination: StopId,
    pub origin_name: String,
    pub destination_name: String,
    /// Itineraries requested per cycle.
    pub max_itineraries: u32,
}

/// The thing a coordinator monitors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTarget {
    Stop(StopTarget),
    Route(RouteTarget),
}

impl MonitorTarget {
    /// Stable identifier used for coordinator and log naming.
    pub fn slug(&self) -> String {
        match self {
            MonitorTarget::Stop(stop) => stop.stop_id.to_string(),
            MonitorTarget::Route(route) => format!("{}_{}", route.origin, route.destination),
        }
    }

    /// Human-readable title, e.g. `Central Station` or `Tel Aviv → Haifa`.
    pub fn title(&self) -> String {
        match self {
            MonitorTarget::Stop(stop) => stop.name.clone(),
            MonitorTarget::Route(route) => {
                format!("{} → {}", route.origin_name, route.destination_name)
            }
        }
    }

    /// Snapshot keys readers are expected to query.
    pub fn keys(&self) -> Vec<String> {
        match self {
            MonitorTarget::Stop(stop) => stop.lines.to_vec(),
            MonitorTarget::Route(_) => vec![ROUTE_KEY.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop_target(lines: &str) -> MonitorTarget {
        MonitorTarget::Stop(StopTarget {
            stop_id: StopId::parse("24068").unwrap(),
            name: "Central".to_string(),
            lines: LineSet::parse(lines).unwrap(),
            max_arrivals: 3,
        })
    }

    fn route_target() -> MonitorTarget {
        MonitorTarget::Route(RouteTarget {
            origin: StopId::parse("3600").unwrap(),
            destination: StopId::parse("4600").unwrap(),
            origin_name: "Tel Aviv".to_string(),
            destination_name: "Haifa".to_string(),
            max_itineraries: 3,
        })
    }

    #[test]
    fn parse_lines_trims_and_dedupes() {
        let set = LineSet::parse(" 249, 40 ,,249, 605 ").unwrap();
        assert_eq!(set.to_vec(), vec!["249", "40", "605"]);
    }

    #[test]
    fn parse_lines_rejects_blank_input() {
        assert_eq!(LineSet::parse(" , ,"), Err(EmptyLineSet));
        assert_eq!(LineSet::parse(""), Err(EmptyLineSet));
    }

    #[test]
    fn contains_is_exact_match() {
        let set = LineSet::parse("249").unwrap();
        assert!(set.contains("249"));
        assert!(!set.contains("24"));
        assert!(!set.contains("249a"));
    }

    #[test]
    fn display_joins_with_comma() {
        let set = LineSet::parse("1,3").unwrap();
        assert_eq!(set.to_string(), "1, 3");
    }

    #[test]
    fn stop_keys_follow_line_order() {
        assert_eq!(stop_target("40,249").keys(), vec!["40", "249"]);
    }

    #[test]
    fn route_has_single_key() {
        assert_eq!(route_target().keys(), vec![ROUTE_KEY]);
    }

    #[test]
    fn slug_and_title() {
        assert_eq!(stop_target("1").slug(), "24068");
        assert_eq!(route_target().slug(), "3600_4600");
        assert_eq!(route_target().title(), "Tel Aviv → Haifa");
    }
}
