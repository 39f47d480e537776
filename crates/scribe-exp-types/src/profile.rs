//! User profile row consumed from the account system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription tier of a Scribe account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    /// Free plan
    Free,
    /// Paid individual plan
    Plus,
    /// Paid professional plan
    Pro,
}

impl std::fmt::Display for UserTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserTier::Free => write!(f, "free"),
            UserTier::Plus => write!(f, "plus"),
            UserTier::Pro => write!(f, "pro"),
        }
    }
}

/// The slice of the account profile audience targeting needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Subscription tier
    pub tier: UserTier,
    /// Account creation time
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Create a profile row
    #[inline]
    #[must_use]
    pub fn new(tier: UserTier, created_at: DateTime<Utc>) -> Self {
        Self { tier, created_at }
    }

    /// Whole days since the account was created
    #[inline]
    #[must_use]
    pub fn account_age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }
}
