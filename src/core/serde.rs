use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Serializes Duration as seconds
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    duration.as_secs_f64().serialize(serializer)
}

/// Deserializes Duration from seconds
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(serde::de::Error::custom(format!("invalid duration: {}", secs)));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[derive(Serialize, Deserialize)]
    struct Test {
        #[serde(serialize_with = "serialize_duration")]
        #[serde(deserialize_with = "deserialize_duration")]
        wait: Duration,
    }

    #[test]
    fn test_duration_serialization() {
        let original = Test {
            wait: Duration::from_millis(250),
        };

        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(serialized, r#"{"wait":0.25}"#);
        let deserialized: Test = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.wait, original.wait);
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(serde_json::from_str::<Test>(r#"{"wait":-1.0}"#).is_err());
    }
}
