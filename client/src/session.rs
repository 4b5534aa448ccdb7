//! Session guard.
//!
//! Gates entry into role-specific areas using the stored bearer token. The
//! token's payload is decoded without checking its signature: the backend
//! enforces authorization, this only decides where to send the user.

use crate::error::StorageError;
use crate::storage::{ClientStorage, TOKEN_KEY};
use crate::types::Route;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use boxoffice_core::environment::Clock;
use boxoffice_core::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default delay before an expired session is sent to login
pub const DEFAULT_EXPIRED_REDIRECT_DELAY: Duration = Duration::from_millis(1500);

/// Why a token could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Not three dot-separated segments
    #[error("Token is not a JWT")]
    Malformed,

    /// Payload segment is not base64url
    #[error("Token payload is not valid base64: {0}")]
    Encoding(String),

    /// Payload is not the expected JSON
    #[error("Token payload is invalid: {0}")]
    Payload(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CapabilityList {
    List(Vec<String>),
    Spaced(String),
}

impl CapabilityList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::List(list) => list,
            Self::Spaced(text) => text.split_whitespace().map(str::to_string).collect(),
        }
    }
}

#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, deserialize_with = "seconds")]
    exp: Option<i64>,
    #[serde(default)]
    capabilities: Option<CapabilityList>,
    #[serde(default)]
    permissions: Option<CapabilityList>,
    #[serde(default)]
    scope: Option<CapabilityList>,
}

/// Epoch seconds, whole or fractional (`1.7e9`); fractions are truncated
#[allow(clippy::cast_possible_truncation)] // saturating cast, sub-second precision is irrelevant
fn seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Whole(i64),
        Fractional(f64),
    }

    Ok(Option::<Seconds>::deserialize(deserializer)?.map(|seconds| match seconds {
        Seconds::Whole(secs) => secs,
        Seconds::Fractional(secs) => secs as i64,
    }))
}

/// Claims read from a token payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject
    pub sub: Option<String>,
    /// Account email
    pub email: Option<String>,
    /// Expiry as seconds since the Unix epoch
    pub exp: Option<i64>,
    /// Granted capabilities such as `event:create`
    pub capabilities: Vec<String>,
}

impl TokenClaims {
    /// Decode the payload segment of `token`
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] if the token is not a JWT or its payload is not
    /// a JSON object.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let mut segments = token.trim().split('.');
        let (Some(_header), Some(payload), Some(_signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        let raw: RawClaims =
            serde_json::from_slice(&bytes).map_err(|e| TokenError::Payload(e.to_string()))?;

        let capabilities = raw
            .capabilities
            .or(raw.permissions)
            .or(raw.scope)
            .map(CapabilityList::into_vec)
            .unwrap_or_default();

        Ok(Self {
            sub: raw.sub,
            email: raw.email,
            exp: raw.exp,
            capabilities,
        })
    }

    /// Whether the token has expired at `now`
    ///
    /// Tokens without an `exp` claim never expire client-side.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp.is_some_and(|exp| exp <= now.timestamp())
    }

    /// Whether the token grants `capability`
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Protected areas of the app
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Area {
    /// User administration
    Admin,
    /// Event publishing
    Publisher,
    /// Organization management
    Organization,
    /// Ticket checkout, open to any signed-in user
    Checkout,
}

impl Area {
    /// Capability required to enter, `None` if any valid token will do
    #[must_use]
    pub const fn required_capability(self) -> Option<&'static str> {
        match self {
            Self::Admin => Some("user:delete"),
            Self::Publisher => Some("event:create"),
            Self::Organization => Some("member:read"),
            Self::Checkout => None,
        }
    }
}

impl std::str::FromStr for Area {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "publisher" => Ok(Self::Publisher),
            "organization" | "org" => Ok(Self::Organization),
            "checkout" => Ok(Self::Checkout),
            other => Err(format!("unknown area: {other}")),
        }
    }
}

/// Outcome of a guard check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    /// Render the protected view
    Granted(TokenClaims),
    /// No usable token
    RedirectToLogin,
    /// The token expired and was cleared; show a notice, then go to login
    SessionExpired {
        /// How long the notice stays up
        redirect_after: Duration,
    },
    /// Signed in, but without the required capability
    AccessDenied,
}

impl Access {
    /// Where the user ends up, `None` when access is granted
    #[must_use]
    pub const fn route(&self) -> Option<Route> {
        match self {
            Self::Granted(_) => None,
            Self::RedirectToLogin | Self::SessionExpired { .. } => Some(Route::Login),
            Self::AccessDenied => Some(Route::AccessDenied),
        }
    }

    /// Whether the protected view may render
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Checks the stored token against an area's requirements
#[derive(Clone)]
pub struct SessionGuard {
    storage: Arc<dyn ClientStorage>,
    clock: Arc<dyn Clock>,
    expired_redirect_delay: Duration,
}

impl SessionGuard {
    /// Create a guard over the token in `storage`
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            expired_redirect_delay: DEFAULT_EXPIRED_REDIRECT_DELAY,
        }
    }

    /// Override how long the session-expired notice stays up
    #[must_use]
    pub fn with_expired_redirect_delay(mut self, delay: Duration) -> Self {
        self.expired_redirect_delay = delay;
        self
    }

    /// Decide whether the user may enter `area`
    ///
    /// An expired token is removed from storage; nothing else is written.
    #[tracing::instrument(skip(self))]
    pub fn check(&self, area: Area) -> Access {
        let Some(claims) = self.stored_claims() else {
            return Access::RedirectToLogin;
        };

        if claims.is_expired(self.clock.now()) {
            tracing::info!(exp = ?claims.exp, "Session expired, clearing token");
            if let Err(error) = self.storage.remove(TOKEN_KEY) {
                tracing::warn!(error = %error, "Could not clear expired token");
            }
            return Access::SessionExpired {
                redirect_after: self.expired_redirect_delay,
            };
        }

        match area.required_capability() {
            Some(capability) if !claims.has_capability(capability) => {
                tracing::debug!(capability, "Missing capability");
                Access::AccessDenied
            },
            _ => Access::Granted(claims),
        }
    }

    /// Run [`SessionGuard::check`] and hand back the bearer token on success
    ///
    /// # Errors
    ///
    /// Returns the non-granting [`Access`] outcome. An expired token has
    /// already been cleared.
    pub fn authorize(&self, area: Area) -> Result<String, Access> {
        match self.check(area) {
            Access::Granted(_) => self.stored_token().ok_or(Access::RedirectToLogin),
            denied => Err(denied),
        }
    }

    /// How long the session-expired notice stays up before the login redirect
    #[must_use]
    pub const fn expired_redirect_delay(&self) -> Duration {
        self.expired_redirect_delay
    }

    /// The stored token if it decodes and has not expired
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        let token = self.stored_token()?;
        let claims = TokenClaims::decode(&token).ok()?;
        (!claims.is_expired(self.clock.now())).then_some(token)
    }

    /// Store a new token
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] if the token cannot be decoded (wrapped in
    /// [`SignInError`]), or a storage error if it cannot be saved.
    pub fn sign_in(&self, token: &str) -> Result<TokenClaims, SignInError> {
        let claims = TokenClaims::decode(token)?;
        self.storage.set(TOKEN_KEY, token.trim())?;
        tracing::info!(email = ?claims.email, "Signed in");
        Ok(claims)
    }

    /// Remove the stored token
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the storage cannot be written.
    pub fn sign_out(&self) -> Result<(), StorageError> {
        self.storage.remove(TOKEN_KEY)
    }

    fn stored_token(&self) -> Option<String> {
        match self.storage.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.trim().is_empty()),
            Err(error) => {
                tracing::warn!(error = %error, "Could not read token");
                None
            },
        }
    }

    fn stored_claims(&self) -> Option<TokenClaims> {
        let token = self.stored_token()?;
        match TokenClaims::decode(&token) {
            Ok(claims) => Some(claims),
            Err(error) => {
                tracing::warn!(error = %error, "Stored token is unreadable");
                None
            },
        }
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("expired_redirect_delay", &self.expired_redirect_delay)
            .finish_non_exhaustive()
    }
}

/// Errors when signing in
#[derive(Debug, Error)]
pub enum SignInError {
    /// The token could not be decoded
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The token could not be saved
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Build an unsigned token carrying `claims`, for tests and demos
#[cfg(any(test, feature = "test-utils"))]
#[must_use]
pub fn unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}
