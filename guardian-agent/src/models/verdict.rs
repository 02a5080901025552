use serde::{Deserialize, Serialize};

/// The risk service's decision for a login attempt.
///
/// Anything the service returns that is not `BLOCK` lets the session
/// continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block,
    Other(String),
}

impl Verdict {
    pub fn is_block(&self) -> bool {
        matches!(self, Verdict::Block)
    }
}

impl From<&str> for Verdict {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "ALLOW" | "ACCEPT" => Verdict::Allow,
            "BLOCK" => Verdict::Block,
            _ => Verdict::Other(s.to_string()),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Allow => write!(f, "ALLOW"),
            Verdict::Block => write!(f, "BLOCK"),
            Verdict::Other(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Verdict::from(s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_block_blocks() {
        assert!(Verdict::from("BLOCK").is_block());
        assert!(!Verdict::from("ALLOW").is_block());
        assert!(!Verdict::from("REVIEW").is_block());
        assert!(!Verdict::from("").is_block());
    }

    #[test]
    fn verdict_parsing_is_case_insensitive() {
        assert_eq!(Verdict::from("block"), Verdict::Block);
        assert_eq!(Verdict::from("Allow"), Verdict::Allow);
    }
}
