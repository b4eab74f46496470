//! MQTT-style topic filter matching.
//!
//! Matching is purely textual and independent of Coaty topic semantics:
//! `+` matches exactly one level, a trailing `#` matches any number of
//! remaining levels.

/// Whether a concrete topic matches a subscription filter.
///
/// Both strings are split into levels on `/` and walked level by level.
/// Empty levels are significant and match each other; `+` also matches an
/// empty level. A `#` anywhere but the final filter level never matches.
/// Without a trailing `#` the level counts must agree exactly.
#[must_use]
pub fn matches(topic: &str, filter: &str) -> bool {
    if topic.is_empty() || filter.is_empty() {
        return false;
    }

    let topic_levels: Vec<&str> = topic.split('/').collect();
    let filter_levels: Vec<&str> = filter.split('/').collect();
    let last = filter_levels.len() - 1;

    for (i, &level) in filter_levels.iter().enumerate() {
        // An absent level behaves like an empty one.
        let topic_level = topic_levels.get(i).copied().unwrap_or("");
        if topic_level.is_empty() {
            if level.is_empty() || level == "+" {
                continue;
            }
            if level != "#" {
                return false;
            }
        }
        if level == "#" {
            return i == last;
        }
        if level != "+" && level != topic_level {
            return false;
        }
    }

    topic_levels.len() == filter_levels.len()
}
