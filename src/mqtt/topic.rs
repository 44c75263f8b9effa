/// Prefix used when the configured prefix is empty after trimming.
pub const DEFAULT_TOPIC_PREFIX: &str = "creatures";

/// Normalize a display name into a path-safe topic segment.
///
/// Rules:
/// - Lower-cased
/// - Letters, digits, `-` and `_` are kept; other characters dropped
/// - Any run of whitespace or `/` becomes a single `-`
/// - Leading/trailing `-` and `_` trimmed
/// - If nothing survives, the original value is returned unchanged
///
/// ```
/// use creature_mqtt::mqtt::slug;
///
/// assert_eq!(slug("Living Room Sensor!"), "living-room-sensor");
/// assert_eq!(slug("   "), "   ");
/// ```
pub fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_separator_run = false;

    for c in value.to_lowercase().chars() {
        if c.is_whitespace() || c == '/' {
            if !in_separator_run {
                out.push('-');
                in_separator_run = true;
            }
            continue;
        }
        in_separator_run = false;

        if c.is_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        }
    }

    let trimmed = out.trim_matches(|c| c == '-' || c == '_');
    if trimmed.is_empty() {
        value.to_string()
    } else {
        trimmed.to_string()
    }
}

fn normalize_prefix(prefix: &str) -> &str {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        DEFAULT_TOPIC_PREFIX
    } else {
        trimmed
    }
}

/// Join `prefix` and slugged `components` with `/`.
///
/// Components that are blank are skipped so a missing segment never produces
/// an empty level (`a//b`).
pub fn topic_string<S: AsRef<str>>(components: &[S], prefix: &str) -> String {
    let mut topic = normalize_prefix(prefix).to_string();
    for component in components {
        let component = component.as_ref();
        if component.trim().is_empty() {
            continue;
        }
        topic.push('/');
        topic.push_str(&slug(component));
    }
    topic
}

/// Topic construction bound to one configured prefix.
#[derive(Clone, Debug)]
pub struct TopicBuilder {
    prefix: String,
}

impl TopicBuilder {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: normalize_prefix(prefix).to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn topic<S: AsRef<str>>(&self, components: &[S]) -> String {
        topic_string(components, &self.prefix)
    }
}

impl Default for TopicBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_basic() {
        assert_eq!(slug("Living Room Sensor!"), "living-room-sensor");
        assert_eq!(slug("Beaky"), "beaky");
        assert_eq!(slug("motor_1"), "motor_1");
    }

    #[test]
    fn test_slug_collapses_whitespace_and_slashes() {
        assert_eq!(slug("front  /  porch"), "front-porch");
        assert_eq!(slug("a\t\nb"), "a-b");
        assert_eq!(slug("left/right"), "left-right");
    }

    #[test]
    fn test_slug_trims_separators() {
        assert_eq!(slug("  --Mr. Creature__ "), "mr-creature");
        assert_eq!(slug("_hidden_"), "hidden");
    }

    #[test]
    fn test_slug_falls_back_to_original() {
        assert_eq!(slug("   "), "   ");
        assert_eq!(slug("!!!"), "!!!");
        assert_eq!(slug(""), "");
    }

    #[test]
    fn test_topic_string_default_prefix() {
        assert_eq!(
            topic_string(&["beaky", "sensors", "board", "temperature_f"], ""),
            "creatures/beaky/sensors/board/temperature_f"
        );
        assert_eq!(topic_string(&["x"], "///"), "creatures/x");
    }

    #[test]
    fn test_topic_string_trims_prefix_slashes() {
        assert_eq!(topic_string(&["jobs", "abc"], "/home/creatures/"), "home/creatures/jobs/abc");
    }

    #[test]
    fn test_topic_string_slugs_components() {
        assert_eq!(
            topic_string(&["Mr Beaky", "sensors", "power", "Motor Rail"], "creatures"),
            "creatures/mr-beaky/sensors/power/motor-rail"
        );
    }

    #[test]
    fn test_topic_string_skips_blank_components() {
        assert_eq!(topic_string(&["a", " ", "b"], "p"), "p/a/b");
    }

    #[test]
    fn test_topic_builder() {
        let builder = TopicBuilder::new("/lab/");
        assert_eq!(builder.prefix(), "lab");
        assert_eq!(builder.topic(&["cache_invalidation", "cache_type"]), "lab/cache_invalidation/cache_type");
        assert_eq!(TopicBuilder::default().prefix(), "creatures");
    }
}
