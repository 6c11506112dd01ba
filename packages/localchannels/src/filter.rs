//! Channel filters used by broadcast and channel enumeration.

use regex::Regex;
use serde_json::Value;

use crate::channel::{Channel, Properties};

/// Predicate over a candidate channel.
pub type ChannelPredicate = Box<dyn Fn(&Channel) -> bool + Send + Sync>;

/// Selects a subset of channels.
pub enum Filter {
    /// Glob over bound names: `*` matches any run of characters, everything
    /// else literally. A channel matches if any of its names matches.
    Name(NamePattern),
    /// Every listed property must be present with an equal value.
    Properties(Properties),
    /// Arbitrary test.
    Predicate(ChannelPredicate),
}

impl Filter {
    pub fn name(pattern: &str) -> Self {
        Filter::Name(NamePattern::new(pattern))
    }

    pub fn properties(required: Properties) -> Self {
        Filter::Properties(required)
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Channel) -> bool + Send + Sync + 'static,
    {
        Filter::Predicate(Box::new(f))
    }

    /// Test a channel snapshot. The snapshot must carry fresh names and
    /// properties for the name and property filters to be meaningful.
    pub fn matches(&self, channel: &Channel) -> bool {
        match self {
            Filter::Name(pattern) => channel.names().iter().any(|n| pattern.matches(n)),
            Filter::Properties(required) => properties_match(required, channel.properties()),
            Filter::Predicate(predicate) => predicate(channel),
        }
    }
}

impl From<&str> for Filter {
    fn from(pattern: &str) -> Self {
        Filter::name(pattern)
    }
}

impl From<Properties> for Filter {
    fn from(required: Properties) -> Self {
        Filter::Properties(required)
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::Name(pattern) => f.debug_tuple("Name").field(&pattern.source).finish(),
            Filter::Properties(required) => f.debug_tuple("Properties").field(required).finish(),
            Filter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

fn properties_match(required: &Properties, actual: &Properties) -> bool {
    required
        .iter()
        .all(|(key, value)| actual.get(key).is_some_and(|v| json_eq(v, value)))
}

/// Equality that treats `1` and `1.0` as the same number.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return x == y;
            }
            x.as_f64() == y.as_f64()
        }
        _ => a == b,
    }
}

/// Compiled glob over channel names.
#[derive(Clone)]
pub struct NamePattern {
    source: String,
    regex: Option<Regex>,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Self {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = match Regex::new(&format!("^(?s:{})$", body)) {
            Ok(regex) => Some(regex),
            Err(e) => {
                // Only reachable through the compiled size limit.
                tracing::warn!(pattern, error = %e, "name pattern matches nothing");
                None
            }
        };
        Self {
            source: pattern.to_string(),
            regex,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ChannelId;
    use serde_json::json;

    fn channel(names: &[&str], properties: Value) -> Channel {
        let properties = match properties {
            Value::Object(map) => map,
            _ => Properties::new(),
        };
        Channel::with_state(
            ChannelId::new(1),
            properties,
            names.iter().map(|n| n.to_string()).collect(),
        )
    }

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn glob_star_matches_any_run() {
        let pattern = NamePattern::new("worker-*");
        assert!(pattern.matches("worker-1"));
        assert!(pattern.matches("worker-"));
        assert!(!pattern.matches("a-worker-1"));

        let pattern = NamePattern::new("*svc*");
        assert!(pattern.matches("svc"));
        assert!(pattern.matches("my-svc-2"));
    }

    #[test]
    fn glob_escapes_special_characters() {
        let pattern = NamePattern::new("a.b+(c)?");
        assert!(pattern.matches("a.b+(c)?"));
        assert!(!pattern.matches("axb+(c)?"));
        assert!(!pattern.matches("a.bb(c)"));

        let pattern = NamePattern::new("line\n*");
        assert!(pattern.matches("line\nrest\nmore"));
    }

    #[test]
    fn name_filter_matches_any_bound_name() {
        let filter = Filter::from("svc.*");
        assert!(filter.matches(&channel(&["other", "svc.primary"], json!({}))));
        assert!(!filter.matches(&channel(&["other"], json!({}))));
        assert!(!filter.matches(&channel(&[], json!({}))));
    }

    #[test]
    fn property_filter_requires_every_key() {
        let filter = Filter::from(props(json!({"role": "worker", "zone": 1})));
        assert!(filter.matches(&channel(&[], json!({"role": "worker", "zone": 1, "x": true}))));
        assert!(filter.matches(&channel(&[], json!({"role": "worker", "zone": 1.0}))));
        assert!(!filter.matches(&channel(&[], json!({"role": "worker"}))));
        assert!(!filter.matches(&channel(&[], json!({"role": "boss", "zone": 1}))));
        assert!(!filter.matches(&channel(&[], json!({"role": "worker", "zone": "1"}))));
    }

    #[test]
    fn empty_property_filter_matches_everything() {
        let filter = Filter::properties(Properties::new());
        assert!(filter.matches(&channel(&[], json!({}))));
    }

    #[test]
    fn predicate_filter() {
        let filter = Filter::predicate(|c| c.id() == ChannelId::new(1));
        assert!(filter.matches(&channel(&[], json!({}))));
        assert_eq!(format!("{:?}", filter), "Predicate(..)");
    }
}
