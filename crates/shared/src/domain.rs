use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid snowflake id: {0:?}")]
pub struct ParseIdError(pub String);

/// Platform ids travel as decimal strings on the wire but some payloads carry
/// them as plain numbers, so both forms are accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSnowflake {
    Text(String),
    Number(u64),
}

fn deserialize_snowflake<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawSnowflake::deserialize(deserializer)? {
        RawSnowflake::Number(value) => Ok(value),
        RawSnowflake::Text(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(ParseIdError(raw))),
    }
}

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                raw.trim()
                    .parse::<u64>()
                    .map($name)
                    .map_err(|_| ParseIdError(raw.to_string()))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserialize_snowflake(deserializer).map($name)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(GuildId);
id_newtype!(ChannelId);

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
