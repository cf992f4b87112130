use crate::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority of a task in the range 0-15.
/// Lower numerical values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 15;

    /// Urgent: 0-4
    pub const URGENT_MAX: u8 = 4;

    /// Normal: 5-10, background above that
    pub const NORMAL_MIN: u8 = 5;
    pub const NORMAL_MAX: u8 = 10;

    /// Create a priority, rejecting values above 15
    pub fn new(value: u8) -> Result<Self> {
        if value > Self::MAX {
            return Err(PoolError::InvalidPriority(value));
        }
        Ok(Priority(value))
    }

    /// Most urgent priority (0)
    pub fn urgent() -> Self {
        Priority(Self::MIN)
    }

    /// Mid-range default (7)
    pub fn normal() -> Self {
        Priority(7)
    }

    /// Least urgent priority (15)
    pub fn background() -> Self {
        Priority(Self::MAX)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Get the tier name
    pub fn tier(&self) -> &'static str {
        match self.0 {
            Self::MIN..=Self::URGENT_MAX => "urgent",
            Self::NORMAL_MIN..=Self::NORMAL_MAX => "normal",
            _ => "background",
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::normal()
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Priority {
    type Error = PoolError;

    fn try_from(value: u8) -> Result<Self> {
        Priority::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}
