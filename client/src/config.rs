//! Configuration management for the booking client.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::pricing::{Pricing, DEFAULT_FEE_PER_TICKET, DEFAULT_VAT_PERCENT};
use crate::reservation::RESERVATION_SECONDS;
use crate::session::DEFAULT_EXPIRED_REDIRECT_DELAY;
use crate::types::Money;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Backend base URL
    pub api_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// File holding the token and booking draft
    pub state_path: PathBuf,
    /// Service fee per ticket in cents
    pub fee_per_ticket_cents: u64,
    /// VAT rate in percent
    pub vat_percent: u32,
    /// Reservation window in seconds
    pub reservation_secs: u32,
    /// How long the session-expired notice stays up, in milliseconds
    pub expired_redirect_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
            state_path: PathBuf::from(".boxoffice/state.json"),
            fee_per_ticket_cents: DEFAULT_FEE_PER_TICKET.cents(),
            vat_percent: DEFAULT_VAT_PERCENT,
            reservation_secs: RESERVATION_SECONDS,
            expired_redirect_ms: u64::try_from(DEFAULT_EXPIRED_REDIRECT_DELAY.as_millis())
                .unwrap_or(1500),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: env::var("BOXOFFICE_API_URL").unwrap_or(defaults.api_url),
            request_timeout_secs: env::var("BOXOFFICE_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            state_path: env::var("BOXOFFICE_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_path),
            fee_per_ticket_cents: env::var("BOXOFFICE_FEE_PER_TICKET_CENTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fee_per_ticket_cents),
            vat_percent: env::var("BOXOFFICE_VAT_PERCENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.vat_percent),
            reservation_secs: env::var("BOXOFFICE_RESERVATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.reservation_secs),
            expired_redirect_ms: env::var("BOXOFFICE_EXPIRED_REDIRECT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.expired_redirect_ms),
        }
    }

    /// Fee and tax parameters
    #[must_use]
    pub const fn pricing(&self) -> Pricing {
        Pricing {
            fee_per_ticket: Money::from_cents(self.fee_per_ticket_cents),
            vat_percent: self.vat_percent,
        }
    }

    /// Per-request timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay before an expired session is sent to login
    #[must_use]
    pub const fn expired_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.expired_redirect_ms)
    }
}
