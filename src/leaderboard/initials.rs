//! Player Initials
//!
//! The only player identity the leaderboard knows about. Validation is
//! format plus an exact-match denylist; nothing fuzzier.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Offensive three-letter strings that may not appear on the board.
pub const BANNED_INITIALS: [&str; 19] = [
    "ASS", "SEX", "FAG", "CUM", "DIE", "JEW", "FUC", "GAY", "PUS", "TIT",
    "DIC", "COC", "NIG", "COK", "DIK", "WTF", "FCK", "NGA", "NGR",
];

/// Initials rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitialsError {
    /// Not exactly three letters.
    #[error("Initials can only contain letters. Please try again.")]
    InvalidFormat,
    /// On the denylist.
    #[error("The initials you have entered are not allowed. Please try again.")]
    Banned,
}

/// Three uppercase ASCII letters.
///
/// Serialized as a plain string; deserialization re-validates the format
/// so a hand-edited store cannot smuggle in lowercase duplicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Initials([u8; 3]);

impl Initials {
    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        // Always ASCII uppercase by construction
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Parse without the denylist check (used when reading stored records).
    fn parse_format(raw: &str) -> Result<Self, InitialsError> {
        let upper = raw.to_ascii_uppercase();
        let bytes = upper.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(InitialsError::InvalidFormat);
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }
}

impl std::fmt::Display for Initials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Initials {
    type Error = InitialsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Initials::parse_format(&value)
    }
}

impl From<Initials> for String {
    fn from(value: Initials) -> Self {
        value.as_str().to_string()
    }
}

/// Normalize and validate player-entered initials.
///
/// Uppercases the input, then requires exactly three ASCII letters and
/// rejects exact (case-insensitive) denylist matches.
pub fn validate_initials(raw: &str) -> Result<Initials, InitialsError> {
    let initials = Initials::parse_format(raw)?;
    if BANNED_INITIALS.contains(&initials.as_str()) {
        return Err(InitialsError::Banned);
    }
    Ok(initials)
}
