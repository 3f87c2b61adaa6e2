use crate::secret::Secret;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for instance identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid SID '{0}': expected 3-4 alphanumeric characters starting with a letter")]
    Sid(String),

    #[error("invalid instance number '{0}': expected two digits (00-99)")]
    InstanceNumber(String),
}

/// SAP system identifier, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sid(String);

impl Sid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the `<sid>adm` OS user that owns the instance.
    pub fn adm_user(&self) -> String {
        format!("{}adm", self.0.to_ascii_lowercase())
    }
}

impl FromStr for Sid {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid_len = (3..=4).contains(&s.len());
        let starts_alpha = s.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        let all_alnum = s.chars().all(|c| c.is_ascii_alphanumeric());
        if valid_len && starts_alpha && all_alnum {
            Ok(Self(s.to_ascii_uppercase()))
        } else {
            Err(IdError::Sid(s.to_string()))
        }
    }
}

impl TryFrom<String> for Sid {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Sid> for String {
    fn from(value: Sid) -> Self {
        value.0
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Two-digit instance number (`00`..`99`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceNumber(u8);

impl InstanceNumber {
    pub fn new(n: u8) -> Result<Self, IdError> {
        if n < 100 {
            Ok(Self(n))
        } else {
            Err(IdError::InstanceNumber(n.to_string()))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl FromStr for InstanceNumber {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.len() == 2 && t.bytes().all(|b| b.is_ascii_digit()) {
            t.parse::<u8>()
                .map(Self)
                .map_err(|_| IdError::InstanceNumber(s.to_string()))
        } else {
            Err(IdError::InstanceNumber(s.to_string()))
        }
    }
}

impl TryFrom<String> for InstanceNumber {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstanceNumber> for String {
    fn from(value: InstanceNumber) -> Self {
        value.to_string()
    }
}

impl fmt::Display for InstanceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// The SAP instance a state operates on, plus the credentials used against
/// its control interface.
#[derive(Debug, Clone)]
pub struct InstanceTarget {
    pub sid: Sid,
    pub instance_number: InstanceNumber,
    pub username: String,
    pub password: Secret,
}

impl InstanceTarget {
    pub fn new(
        sid: Sid,
        instance_number: InstanceNumber,
        username: impl Into<String>,
        password: Secret,
    ) -> Self {
        Self {
            sid,
            instance_number,
            username: username.into(),
            password,
        }
    }

    /// Short human label, e.g. `S4H / 00`.
    pub fn label(&self) -> String {
        format!("{} / {}", self.sid, self.instance_number)
    }
}
