use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A catalog id that can arrive as a number, a numeric string,
/// a `"movie/123"` style prefixed string, or null
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlexId {
    Number(u64),
    #[default]
    Null,
}

impl FlexId {
    /// Parse a textual id, accepting a `movie/` or `tv/` prefix
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("movie/")
            .or_else(|| trimmed.strip_prefix("tv/"))
            .unwrap_or(trimmed);
        digits.parse::<u64>().map(FlexId::Number).unwrap_or(FlexId::Null)
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FlexId::Number(n) => Some(*n),
            FlexId::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FlexId::Null)
    }
}

impl fmt::Display for FlexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlexId::Number(n) => write!(f, "{}", n),
            FlexId::Null => write!(f, "null"),
        }
    }
}

impl Serialize for FlexId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FlexId::Number(n) => serializer.serialize_u64(*n),
            FlexId::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for FlexId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct FlexIdVisitor;

        impl<'de> Visitor<'de> for FlexIdVisitor {
            type Value = FlexId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number, string, or null")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(u64::try_from(v).map(FlexId::Number).unwrap_or(FlexId::Null))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlexId::Number(v))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v >= 0.0 && v.fract() == 0.0 {
                    Ok(FlexId::Number(v as u64))
                } else {
                    Ok(FlexId::Null)
                }
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlexId::parse(v))
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlexId::Null)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FlexId::Null)
            }
        }

        deserializer.deserialize_any(FlexIdVisitor)
    }
}

/// Scores come back as numbers, strings, or null depending on the endpoint
pub fn deserialize_flex_option_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) if n.is_finite() => Some(n),
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    })
}

/// Page counters sometimes arrive as strings
pub fn deserialize_flex_option_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let flex = FlexId::deserialize(deserializer)?;
    Ok(flex.as_u64().and_then(|n| u32::try_from(n).ok()))
}
