//! Operating mode: work or personal.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Work,
    /// The safer default when nothing points at work.
    #[default]
    Personal,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Ok(Self::Work),
            "personal" => Ok(Self::Personal),
            other => Err(format!("unknown mode '{other}' (expected work or personal)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_modes() {
        assert_eq!("work".parse::<Mode>().unwrap(), Mode::Work);
        assert_eq!(" Personal ".parse::<Mode>().unwrap(), Mode::Personal);
        assert!("weekend".parse::<Mode>().is_err());
    }

    #[test]
    fn default_is_personal() {
        assert_eq!(Mode::default(), Mode::Personal);
        assert_eq!(Mode::Work.to_string(), "work");
    }
}
