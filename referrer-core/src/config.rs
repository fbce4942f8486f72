use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime knobs for a [`ReferrerResolver`](crate::ReferrerResolver).
///
/// All fields carry defaults so a partial config file only overrides what
/// it names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// How long `get_attribution` waits before giving up, e.g. `"5s"`.
    /// `None` waits until the service answers, which may be forever if the
    /// service drops its callback.
    #[serde(with = "humantime_opt", skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Duration>,
}

impl ResolverConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

mod humantime_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_str(
                &humantime::format_duration(*duration).to_string(),
            ),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|text| {
            humantime::parse_duration(text.trim()).map_err(D::Error::custom)
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_human_readable_timeout() {
        let config: ResolverConfig =
            serde_json::from_str(r#"{"request_timeout":"2s 250ms"}"#)
                .expect("parse config");
        assert_eq!(config.request_timeout, Some(Duration::from_millis(2250)));
    }

    #[test]
    fn missing_timeout_defaults_to_none() {
        let config: ResolverConfig =
            serde_json::from_str("{}").expect("parse config");
        assert_eq!(config, ResolverConfig::default());
    }

    #[test]
    fn rejects_garbage_timeout() {
        serde_json::from_str::<ResolverConfig>(r#"{"request_timeout":"soon"}"#)
            .expect_err("invalid duration");
    }
}
