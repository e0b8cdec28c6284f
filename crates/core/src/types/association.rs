//! Student associations that publish on the portal.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a string is not a known association code.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown association: {0}")]
pub struct AssociationError(pub String);

/// An association members can subscribe to and publishers can publish as.
///
/// Serialized as its lowercase code (`"bde"`, `"bds"`, ...), which is also the
/// value stored in profile documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Association {
    Bde,
    Bds,
    Bdc,
    Bdj,
    Bda,
    Bdh,
    Pnc,
}

impl Association {
    /// Every association, in menu order.
    pub const ALL: [Self; 7] = [
        Self::Bde,
        Self::Bds,
        Self::Bdc,
        Self::Bdj,
        Self::Bda,
        Self::Bdh,
        Self::Pnc,
    ];

    /// Lowercase code used in storage and routes.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Bde => "bde",
            Self::Bds => "bds",
            Self::Bdc => "bdc",
            Self::Bdj => "bdj",
            Self::Bda => "bda",
            Self::Bdh => "bdh",
            Self::Pnc => "pnc",
        }
    }
}

impl fmt::Display for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Association {
    type Err = AssociationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| AssociationError(s.to_owned()))
    }
}
