//! Transaction propagation modes

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// How a unit of work relates to a transaction that may already be active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the active transaction, or begin one
    #[default]
    Required,
    /// Begin a new transaction if one is active; otherwise run without one
    Supports,
    /// Like `Supports`, but an active transaction is mandatory
    Mandatory,
    /// Run on an independent connection inside its own transaction
    RequiresNew,
    /// Run on an independent connection without a transaction
    NotSupported,
    /// Fail if a transaction is active
    Never,
    /// Join the active transaction behind a savepoint, or begin one
    Nested,
    /// Begin a transaction; fail if one is already active
    NotRequired,
}

impl Propagation {
    pub const ALL: [Propagation; 8] = [
        Propagation::Required,
        Propagation::Supports,
        Propagation::Mandatory,
        Propagation::RequiresNew,
        Propagation::NotSupported,
        Propagation::Never,
        Propagation::Nested,
        Propagation::NotRequired,
    ];

    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Required => "REQUIRED",
            Propagation::Supports => "SUPPORTS",
            Propagation::Mandatory => "MANDATORY",
            Propagation::RequiresNew => "REQUIRES_NEW",
            Propagation::NotSupported => "NOT_SUPPORTED",
            Propagation::Never => "NEVER",
            Propagation::Nested => "NESTED",
            Propagation::NotRequired => "NOT_REQUIRED",
        }
    }

    /// Whether this mode hands work to an independently connected delegate
    pub fn uses_delegate(&self) -> bool {
        matches!(self, Propagation::RequiresNew | Propagation::NotSupported)
    }
}

impl Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts canonical names, optionally prefixed with `PROPAGATION_`,
/// case-insensitively. Anything else is a caller contract violation.
impl FromStr for Propagation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("PROPAGATION_").unwrap_or(&upper);
        Propagation::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| Error::unsupported_propagation(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for p in Propagation::ALL {
            assert_eq!(p.to_string().parse::<Propagation>().unwrap(), p);
        }
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!("nested".parse::<Propagation>().unwrap(), Propagation::Nested);
        assert_eq!(
            "PROPAGATION_REQUIRES_NEW".parse::<Propagation>().unwrap(),
            Propagation::RequiresNew
        );
    }

    #[test]
    fn test_unknown_is_contract_violation() {
        let err = "SOMETIMES".parse::<Propagation>().unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_serde_uses_canonical_names() {
        assert_eq!(
            serde_json::to_string(&Propagation::NotSupported).unwrap(),
            "\"NOT_SUPPORTED\""
        );
        let p: Propagation = serde_json::from_str("\"REQUIRES_NEW\"").unwrap();
        assert_eq!(p, Propagation::RequiresNew);
        assert!(serde_json::from_str::<Propagation>("\"BOGUS\"").is_err());
    }

    #[test]
    fn test_uses_delegate() {
        let delegating: Vec<_> = Propagation::ALL
            .into_iter()
            .filter(Propagation::uses_delegate)
            .collect();
        assert_eq!(
            delegating,
            vec![Propagation::RequiresNew, Propagation::NotSupported]
        );
    }
}
