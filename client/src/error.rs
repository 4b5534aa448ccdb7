//! Error types for the booking client.
//!
//! Every failure a screen can hit ends up as one of these values. None of them
//! escape as panics: storage and decoding problems degrade to "absent", backend
//! problems become a generic notification, and auth problems become redirects.

use crate::types::{EventId, PaymentMethod, Route};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the persisted client state
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the state file failed
    #[error("Storage I/O failed for {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A value could not be serialized
    #[error("Storage serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors when creating or loading a booking draft
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    /// Quantity must be at least one
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    /// The event has no tier with this name
    #[error("Unknown ticket type: {0}")]
    UnknownTicketType(String),

    /// The tier has fewer tickets left than requested
    #[error("Only {remaining} tickets left for {ticket_type} (requested {requested})")]
    NotEnoughTickets {
        /// Tier name
        ticket_type: String,
        /// Quantity asked for
        requested: u32,
        /// Quantity available
        remaining: u32,
    },

    /// Amounts do not fit in the money representation
    #[error("Booking amount is too large")]
    AmountOverflow,

    /// No draft is stored (or the stored one was unreadable)
    #[error("No booking found")]
    NotFound,

    /// The stored draft belongs to a different event
    #[error("Stored booking is for event {found}, not {expected}")]
    Stale {
        /// Event being viewed
        expected: EventId,
        /// Event the draft was made for
        found: EventId,
    },

    /// The draft could not be persisted
    #[error("Booking could not be saved: {0}")]
    Storage(String),
}

impl From<StorageError> for DraftError {
    fn from(error: StorageError) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Errors from the REST backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request never produced a response
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The response body was not what we expected
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),

    /// The bearer token was rejected
    #[error("Unauthorized")]
    Unauthorized,

    /// The resource does not exist
    #[error("Not found")]
    NotFound,

    /// Any other non-2xx response
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },
}

/// Errors when turning a purchase response into a scannable code
#[derive(Debug, Error)]
pub enum ConfirmationError {
    /// The payload could not be serialized
    #[error("Confirmation payload could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The payload does not fit in a QR code
    #[error("Confirmation payload could not be encoded: {0}")]
    Encode(String),
}

/// Why a checkout attempt was blocked or failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    /// Terms of service checkbox not ticked
    #[error("Terms of service not accepted")]
    TermsNotAccepted,

    /// Resale policy checkbox not ticked
    #[error("Resale policy not accepted")]
    ResalePolicyNotAccepted,

    /// No usable auth token
    #[error("Not signed in")]
    Unauthenticated,

    /// The auth token has expired and was cleared
    #[error("Session expired")]
    SessionExpired,

    /// No booking draft stored
    #[error("No booking found")]
    MissingDraft,

    /// The stored draft belongs to another event
    #[error("Booking is for a different event")]
    StaleDraft,

    /// Quantity below one
    #[error("Invalid quantity")]
    InvalidQuantity,

    /// The selected method is shown but not accepted
    #[error("Payment method {0} is not available")]
    PaymentMethodUnavailable(PaymentMethod),

    /// The reservation window has elapsed
    #[error("Reservation expired")]
    ReservationExpired,

    /// The backend rejected or never answered the purchase
    #[error("Purchase failed: {0}")]
    PurchaseFailed(String),
}

impl CheckoutError {
    /// Message shown next to the submit button
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::TermsNotAccepted => "Please accept the terms of service.",
            Self::ResalePolicyNotAccepted => "Please accept the resale policy.",
            Self::Unauthenticated => "Please create an account or sign in to continue.",
            Self::SessionExpired => "Your session has expired. Please sign in again.",
            Self::MissingDraft => "No booking details found. Please select your tickets again.",
            Self::StaleDraft => "Your selection is for a different event. Please select your tickets again.",
            Self::InvalidQuantity => "Please select at least one ticket.",
            Self::PaymentMethodUnavailable(_) => "This payment method is not available yet.",
            Self::ReservationExpired => "Your booking session has expired.",
            Self::PurchaseFailed(_) => "Payment or ticket creation failed. Please try again.",
        }
    }

    /// Screen to navigate to, if the error forces navigation
    #[must_use]
    pub const fn redirect(&self) -> Option<Route> {
        match self {
            Self::Unauthenticated => Some(Route::SignUp),
            Self::SessionExpired => Some(Route::Login),
            _ => None,
        }
    }

    /// Whether this is a local check that never reached the backend
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        !matches!(self, Self::PurchaseFailed(_) | Self::ReservationExpired)
    }
}

impl From<DraftError> for CheckoutError {
    fn from(error: DraftError) -> Self {
        match error {
            DraftError::Stale { .. } => Self::StaleDraft,
            DraftError::InvalidQuantity => Self::InvalidQuantity,
            _ => Self::MissingDraft,
        }
    }
}
