use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_FINGER_SLOT, MAX_FINGER_SLOT, MAX_USER_ID_LENGTH, MIN_FINGER_SLOT};
use crate::error::{Error, Result};

/// User identifier as stored in the terminal's PIN field.
///
/// Non-empty, ASCII alphanumeric, at most
/// [`MAX_USER_ID_LENGTH`] characters.
///
/// ```
/// use biobridge_core::UserId;
///
/// let id = UserId::new(" 1042 ").unwrap();
/// assert_eq!(id.as_str(), "1042");
/// assert!(UserId::new("").is_err());
/// assert!(UserId::new("1234567890").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a validated user id. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    /// Returns `Error::InvalidUserId` if the id is empty, too long or
    /// contains anything other than ASCII letters and digits.
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref().trim();

        if id.is_empty() {
            return Err(Error::InvalidUserId("user id is empty".to_string()));
        }
        if id.len() > MAX_USER_ID_LENGTH {
            return Err(Error::InvalidUserId(format!(
                "{id} exceeds {MAX_USER_ID_LENGTH} characters"
            )));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidUserId(format!(
                "{id} contains characters other than letters and digits"
            )));
        }

        Ok(UserId(id.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        UserId::new(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        UserId::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl PartialEq<str> for UserId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Finger slot used for enrollment (1-10).
///
/// Slots are numbered from one for operators. The terminal stores
/// templates by zero-based index, see [`FingerSlot::template_index`].
///
/// ```
/// use biobridge_core::FingerSlot;
///
/// let slot = FingerSlot::new(3).unwrap();
/// assert_eq!(slot.template_index(), 2);
/// assert_eq!(FingerSlot::default().get(), 1);
/// assert!(FingerSlot::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FingerSlot(u8);

impl FingerSlot {
    /// # Errors
    /// Returns `Error::InvalidFingerSlot` outside 1-10.
    pub fn new(slot: u8) -> Result<Self> {
        if !(MIN_FINGER_SLOT..=MAX_FINGER_SLOT).contains(&slot) {
            return Err(Error::InvalidFingerSlot(slot));
        }
        Ok(FingerSlot(slot))
    }

    #[must_use]
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Zero-based template index on the terminal.
    #[must_use]
    pub fn template_index(&self) -> u8 {
        self.0 - MIN_FINGER_SLOT
    }
}

impl Default for FingerSlot {
    fn default() -> Self {
        FingerSlot(DEFAULT_FINGER_SLOT)
    }
}

impl fmt::Display for FingerSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for FingerSlot {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        FingerSlot::new(value)
    }
}

impl From<FingerSlot> for u8 {
    fn from(slot: FingerSlot) -> Self {
        slot.0
    }
}

/// Kind of attendance event reported with each scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunchKind {
    CheckIn,
    CheckOut,
    BreakOut,
    BreakIn,
    OtIn,
    OtOut,
    Unknown,
}

impl PunchKind {
    /// Map a raw punch code. Codes outside 0-5 are [`PunchKind::Unknown`].
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => PunchKind::CheckIn,
            1 => PunchKind::CheckOut,
            2 => PunchKind::BreakOut,
            3 => PunchKind::BreakIn,
            4 => PunchKind::OtIn,
            5 => PunchKind::OtOut,
            _ => PunchKind::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PunchKind::CheckIn => "check_in",
            PunchKind::CheckOut => "check_out",
            PunchKind::BreakOut => "break_out",
            PunchKind::BreakIn => "break_in",
            PunchKind::OtIn => "ot_in",
            PunchKind::OtOut => "ot_out",
            PunchKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PunchKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readable name of a punch code.
///
/// ```
/// use biobridge_core::punch_name;
///
/// assert_eq!(punch_name(0), "check_in");
/// assert_eq!(punch_name(5), "ot_out");
/// assert_eq!(punch_name(42), "unknown");
/// ```
#[must_use]
pub fn punch_name(code: i32) -> &'static str {
    PunchKind::from_code(code).as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "check_in")]
    #[case(1, "check_out")]
    #[case(2, "break_out")]
    #[case(3, "break_in")]
    #[case(4, "ot_in")]
    #[case(5, "ot_out")]
    #[case(6, "unknown")]
    #[case(15, "unknown")]
    #[case(255, "unknown")]
    #[case(-1, "unknown")]
    #[case(i32::MAX, "unknown")]
    fn test_punch_name(#[case] code: i32, #[case] expected: &str) {
        assert_eq!(punch_name(code), expected);
    }

    #[test]
    fn test_punch_kind_serializes_as_name() {
        let json = serde_json::to_string(&PunchKind::BreakIn).unwrap();
        assert_eq!(json, "\"break_in\"");
    }

    #[rstest]
    #[case("1")]
    #[case("42")]
    #[case("EMP007")]
    #[case("123456789")]
    fn test_user_id_valid(#[case] raw: &str) {
        let id = UserId::new(raw).unwrap();
        assert_eq!(id.as_str(), raw);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("1234567890")]
    #[case("12-34")]
    #[case("john doe")]
    fn test_user_id_invalid(#[case] raw: &str) {
        assert!(matches!(UserId::new(raw), Err(Error::InvalidUserId(_))));
    }

    #[test]
    fn test_user_id_deserialize_validates() {
        let id: UserId = serde_json::from_str("\"77\"").unwrap();
        assert_eq!(id.as_str(), "77");
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
    }

    #[test]
    fn test_finger_slot_range() {
        assert!(FingerSlot::new(1).is_ok());
        assert!(FingerSlot::new(10).is_ok());
        assert!(matches!(
            FingerSlot::new(0),
            Err(Error::InvalidFingerSlot(0))
        ));
        assert!(matches!(
            FingerSlot::new(11),
            Err(Error::InvalidFingerSlot(11))
        ));
    }

    #[test]
    fn test_finger_slot_template_index() {
        assert_eq!(FingerSlot::new(1).unwrap().template_index(), 0);
        assert_eq!(FingerSlot::new(10).unwrap().template_index(), 9);
    }
}
