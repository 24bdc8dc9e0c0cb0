//! User accounts, tiers, and preferences.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Role attached to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full administrative access.
    Admin,
    /// Regular user.
    Standard,
}

/// Queue admission tier. Higher tiers are admitted ahead of lower ones,
/// but never preempt in-flight work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Lowest admission priority.
    Standard,
    /// Paid tier.
    Premium,
    /// Operators.
    Admin,
}

impl Tier {
    /// Admission rank; larger is admitted first.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Standard => 0,
            Self::Premium => 1,
            Self::Admin => 2,
        }
    }
}

/// Per-user generation preferences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Preferred model; bypasses routing when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_model: Option<String>,
    /// Preferred sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Thinking-mode override; `None` means model default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_enabled: Option<bool>,
    /// Custom prompt appended as the final system-prompt layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_prompt: Option<String>,
    /// Context-token threshold that triggers conversation summarization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarize_threshold: Option<u64>,
}

/// Default summarization threshold in context tokens.
pub const DEFAULT_SUMMARIZE_THRESHOLD: u64 = 9000;

impl UserPreferences {
    /// Summarization threshold with the platform default applied.
    #[must_use]
    pub fn summarize_threshold(&self) -> u64 {
        self.summarize_threshold.unwrap_or(DEFAULT_SUMMARIZE_THRESHOLD)
    }
}

/// A user account with its weekly token budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Account id.
    pub user_id: UserId,
    /// Display name.
    pub display_name: String,
    /// Role.
    pub role: UserRole,
    /// Queue admission tier.
    pub tier: Tier,
    /// Generation preferences.
    pub preferences: UserPreferences,
    /// Weekly token allowance.
    pub weekly_budget: u64,
    /// Bonus tokens granted by an admin, consumed after the weekly budget.
    pub bonus_tokens: u64,
    /// Tokens consumed since the last weekly reset.
    pub tokens_used_this_week: u64,
    /// Start of the current budget week (Monday 00:00 UTC).
    pub week_started_at: DateTime<Utc>,
    /// Whether the account is banned.
    pub banned: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Create a fresh standard-tier account.
    pub fn new(user_id: UserId, display_name: impl Into<String>, weekly_budget: u64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            display_name: display_name.into(),
            role: UserRole::Standard,
            tier: Tier::Standard,
            preferences: UserPreferences::default(),
            weekly_budget,
            bonus_tokens: 0,
            tokens_used_this_week: 0,
            week_started_at: monday_of(now),
            banned: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Tokens the user may still spend this week. Never negative.
    #[must_use]
    pub fn tokens_remaining(&self) -> u64 {
        self.weekly_budget
            .saturating_add(self.bonus_tokens)
            .saturating_sub(self.tokens_used_this_week)
    }

    /// Apply the weekly rollover if a Monday UTC boundary has passed.
    ///
    /// Returns `true` if a reset happened. Called on the first request after
    /// the rollover rather than by a scheduled job.
    pub fn maybe_reset_week(&mut self, now: DateTime<Utc>) -> bool {
        let current_week = monday_of(now);
        if current_week > self.week_started_at {
            self.tokens_used_this_week = 0;
            self.week_started_at = current_week;
            self.updated_at = now;
            return true;
        }
        false
    }

    /// Record token usage for a completed turn.
    pub fn record_usage(&mut self, tokens: u64) {
        self.tokens_used_this_week = self.tokens_used_this_week.saturating_add(tokens);
        self.updated_at = Utc::now();
    }
}

/// Truncate a timestamp to the Monday 00:00 UTC that starts its week.
fn monday_of(ts: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = i64::from(ts.weekday().num_days_from_monday());
    let date = ts.date_naive() - Duration::days(days_from_monday);
    DateTime::from_naive_utc_and_offset(date.and_hms_opt(0, 0, 0).unwrap_or_default(), Utc)
}

/// A linked authentication method.
///
/// `(provider, provider_user_id)` is unique; several methods may link to the
/// same account. Credential contents are opaque to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthMethod {
    /// Provider name ("password", "discord", "oidc", ...).
    pub provider: String,
    /// User id within the provider's namespace.
    pub provider_user_id: String,
    /// Owning account.
    pub user_id: UserId,
    /// Opaque credentials blob (hash, token, ...).
    pub credentials: String,
    /// Whether this is the primary sign-in method.
    pub is_primary: bool,
    /// Whether the method has been verified.
    pub is_verified: bool,
}
