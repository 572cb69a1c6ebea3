// Shapes shared by the issuer and the scanner, plus the JSON bodies the
// backend speaks. The token itself stays opaque: we never look inside the
// payload, and only the server decides whether it is still valid.

use crate::error::DurationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_VALIDITY_MINUTES: u32 = 1;
pub const DEFAULT_VALIDITY_MINUTES: u32 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleId(pub String);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How long an issued token stays redeemable. Always a whole number of
/// minutes, at least [`MIN_VALIDITY_MINUTES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ValidityMinutes(u32);

impl ValidityMinutes {
    pub fn new(minutes: i64) -> Result<Self, DurationError> {
        if minutes < i64::from(MIN_VALIDITY_MINUTES) {
            return Err(DurationError::TooShort { minutes });
        }
        u32::try_from(minutes)
            .map(ValidityMinutes)
            .map_err(|_| DurationError::NotANumber(minutes.to_string()))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::minutes(i64::from(self.0))
    }
}

impl Default for ValidityMinutes {
    fn default() -> Self {
        ValidityMinutes(DEFAULT_VALIDITY_MINUTES)
    }
}

impl FromStr for ValidityMinutes {
    type Err = DurationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        // i64 parsing already rejects "", "1.5", "-", "abc" and friends
        let minutes = trimmed
            .parse::<i64>()
            .map_err(|_| DurationError::NotANumber(trimmed.to_owned()))?;
        ValidityMinutes::new(minutes)
    }
}

impl fmt::Display for ValidityMinutes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest {
    pub duration_minutes: ValidityMinutes,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenResponse {
    // Older backends spell this qrCodeUrl / qrCodeURL
    #[serde(alias = "qrCodeUrl", alias = "qrCodeURL")]
    pub qr_image_url: String,
    pub expires_at: DateTime<Utc>,
    // Only sent by backends that let the client render the code itself.
    #[serde(default)]
    pub qr_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInRequest<'a> {
    pub payload: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckInResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// A displayable QR code for one issued token. Derived from an issuance
/// response and thrown away when the dialog closes or a newer request
/// replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrArtifact {
    pub class_id: ClassId,
    pub schedule_id: ScheduleId,
    pub validity: ValidityMinutes,
    pub image_url: String,
    pub payload: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub request_id: u64,
}

impl QrArtifact {
    // For the countdown only. Redemption is checked by the server.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        let remaining = self.expires_at - now;
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
