//! Domain types for the booking flow.
//!
//! Value objects shared by the draft store, the session guard, the checkout
//! reducer and the backend client. Backend payloads use camelCase field names.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of an event as issued by the backend
///
/// The backend is free to use numeric or string ids; both deserialize into
/// the same textual form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Create an `EventId` from its textual form
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as it appears in URLs
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Number(number) => Self(number.to_string()),
        })
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in minor units (cents) to avoid floating-point arithmetic errors
///
/// Serialized as an integer number of cents. Backend prices arrive as decimal
/// numbers and go through [`Money::from_decimal`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero in any currency
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole units, `None` on overflow
    #[must_use]
    pub const fn from_major(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Converts a decimal amount (as sent by the backend) to cents
    ///
    /// Rounds to the nearest cent. Negative, non-finite and out-of-range
    /// amounts are rejected.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn from_decimal(amount: f64) -> Option<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents > u64::MAX as f64 {
            return None;
        }
        Some(Self(cents as u64))
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// `percent`% of this amount, rounded half-up to the cent
    #[must_use]
    pub const fn checked_percent(self, percent: u32) -> Option<Self> {
        match self.0.checked_mul(percent as u64) {
            Some(product) => match product.checked_add(50) {
                Some(rounded) => Some(Self(rounded / 100)),
                None => None,
            },
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

fn decimal_money<'de, D>(deserializer: D) -> Result<Money, D::Error>
where
    D: Deserializer<'de>,
{
    let amount = f64::deserialize(deserializer)?;
    Money::from_decimal(amount)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid price: {amount}")))
}

// ============================================================================
// Backend payloads
// ============================================================================

/// A ticket tier of an event
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    /// Tier name, unique per event
    #[serde(alias = "ticketTypeName")]
    pub name: String,
    /// Unit price
    #[serde(deserialize_with = "decimal_money")]
    pub price: Money,
    /// Tickets left in this tier, when the backend reports it
    #[serde(default, alias = "remainingTickets", alias = "availableTickets")]
    pub remaining: Option<u32>,
}

/// Event detail as returned by `GET /events/{eventId}`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetail {
    /// Event id
    #[serde(alias = "eventId")]
    pub id: EventId,
    /// Display title
    #[serde(default, alias = "name")]
    pub title: String,
    /// ISO currency code prices are quoted in
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Free events are booked without charging anything
    #[serde(default)]
    pub is_free_event: bool,
    /// Purchasable tiers
    #[serde(default)]
    pub ticket_types: Vec<TicketType>,
    /// Email of the publishing account, used to look up contact details
    #[serde(default, alias = "organizerEmail", alias = "createdBy")]
    pub publisher_email: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl EventDetail {
    /// Look up a tier by name
    #[must_use]
    pub fn ticket_type(&self, name: &str) -> Option<&TicketType> {
        self.ticket_types.iter().find(|t| t.name == name)
    }
}

/// Public profile as returned by `GET /user/{email}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Account email
    pub email: String,
    /// Display name
    #[serde(default, alias = "fullName")]
    pub name: Option<String>,
    /// Contact phone
    #[serde(default, alias = "phoneNumber")]
    pub phone: Option<String>,
}

// ============================================================================
// Booking
// ============================================================================

/// Payment methods offered at checkout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Card payment
    #[default]
    Card,
    /// `PayPal` (shown, not yet accepted)
    Paypal,
}

impl PaymentMethod {
    /// Whether checkout accepts this method
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Card)
    }

    /// Wire name of the method
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Paypal => "paypal",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "card" => Ok(Self::Card),
            "paypal" => Ok(Self::Paypal),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// The user's in-progress ticket selection for one event
///
/// Persisted under the `currentBooking` key between the event page and the
/// payment screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDraft {
    /// Event being booked
    pub event_id: EventId,
    /// Selected tier name
    pub ticket_type: String,
    /// Number of tickets, at least 1
    pub quantity: u32,
    /// Currency of every amount below
    pub currency: String,
    /// Booked on a free event
    #[serde(default)]
    pub free: bool,
    /// Unit price × quantity
    pub price: Money,
    /// Service fee for all tickets
    pub fees: Money,
    /// Tax on the subtotal
    pub vat: Money,
    /// `price + fees + vat`, zero for free events
    pub total: Money,
}

impl BookingDraft {
    /// Whether this draft belongs to the given event
    #[must_use]
    pub fn is_for(&self, event_id: &EventId) -> bool {
        &self.event_id == event_id
    }
}

/// Purchase request sent to `POST /tickets/purchase/{eventId}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurchaseRequest {
    /// Event to buy tickets for (path segment)
    pub event_id: EventId,
    /// Number of tickets
    pub quantity: u32,
    /// Tier name
    pub ticket_type_name: String,
    /// How the user pays
    pub payment_method: PaymentMethod,
    /// Optional promo code, validated by the backend only
    pub promo_code: Option<String>,
}

impl PurchaseRequest {
    /// Build the request for a draft
    #[must_use]
    pub fn from_draft(
        draft: &BookingDraft,
        payment_method: PaymentMethod,
        promo_code: Option<String>,
    ) -> Self {
        Self {
            event_id: draft.event_id.clone(),
            quantity: draft.quantity,
            ticket_type_name: draft.ticket_type.clone(),
            payment_method,
            promo_code: promo_code.filter(|code| !code.trim().is_empty()),
        }
    }

    /// Query parameters in the order the backend documents them
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("quantity", self.quantity.to_string()),
            ("ticketTypeName", self.ticket_type_name.clone()),
            ("paymentMethod", self.payment_method.as_str().to_string()),
        ];
        if let Some(code) = &self.promo_code {
            pairs.push(("promoCode", code.clone()));
        }
        pairs
    }
}

// ============================================================================
// Navigation
// ============================================================================

/// Screens the flow can send the user to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// Home / event listing
    Home,
    /// Sign-in screen
    Login,
    /// Account creation screen
    SignUp,
    /// Shown when the signed-in user lacks a capability
    AccessDenied,
}

/// Blocking notices shown over a screen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    /// The reservation window elapsed; the only way out is back home
    ReservationExpired,
    /// The sign-in session expired; the user is sent to login shortly
    SessionExpired,
}

impl Notice {
    /// Text shown to the user
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ReservationExpired => {
                "Your booking session has expired. Please select your tickets again."
            },
            Self::SessionExpired => "Your session has expired. Please sign in again.",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_accept_numbers_and_strings() {
        let numeric: EventId = serde_json::from_str("42").unwrap();
        let text: EventId = serde_json::from_str("\"evt-9\"").unwrap();
        assert_eq!(numeric.as_str(), "42");
        assert_eq!(text.as_str(), "evt-9");
    }

    #[test]
    fn event_detail_parses_backend_shape() {
        let json = r#"{
            "id": 7,
            "title": "Jazz Night",
            "currency": "USD",
            "isFreeEvent": false,
            "ticketTypes": [
                {"name": "VIP", "price": 100, "remainingTickets": 12},
                {"name": "General", "price": 49.99}
            ],
            "publisherEmail": "host@example.com"
        }"#;

        let event: EventDetail = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, EventId::new("7"));
        assert_eq!(event.ticket_type("VIP").unwrap().price, Money::from_cents(10_000));
        assert_eq!(event.ticket_type("VIP").unwrap().remaining, Some(12));
        assert_eq!(event.ticket_type("General").unwrap().price, Money::from_cents(4_999));
        assert_eq!(event.ticket_type("General").unwrap().remaining, None);
        assert!(event.ticket_type("Balcony").is_none());
    }

    #[test]
    fn negative_prices_are_rejected() {
        let json = r#"{"name": "VIP", "price": -1}"#;
        assert!(serde_json::from_str::<TicketType>(json).is_err());
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Money::from_cents(20_000).checked_percent(15), Some(Money::from_cents(3_000)));
        // 15% of 0.10 is 0.015, rounds to 0.02
        assert_eq!(Money::from_cents(10).checked_percent(15), Some(Money::from_cents(2)));
        assert_eq!(Money::from_cents(3).checked_percent(15), Some(Money::ZERO));
    }

    #[test]
    fn money_displays_two_decimals() {
        assert_eq!(Money::from_cents(23_405).to_string(), "234.05");
    }

    #[test]
    fn purchase_query_omits_blank_promo_code() {
        let draft = BookingDraft {
            event_id: EventId::new("7"),
            ticket_type: "VIP".to_string(),
            quantity: 2,
            currency: "USD".to_string(),
            free: false,
            price: Money::from_cents(20_000),
            fees: Money::from_cents(400),
            vat: Money::from_cents(3_000),
            total: Money::from_cents(23_400),
        };

        let request = PurchaseRequest::from_draft(&draft, PaymentMethod::Card, Some("  ".into()));
        assert_eq!(
            request.query_pairs(),
            vec![
                ("quantity", "2".to_string()),
                ("ticketTypeName", "VIP".to_string()),
                ("paymentMethod", "card".to_string()),
            ]
        );

        let request = PurchaseRequest::from_draft(&draft, PaymentMethod::Card, Some("SPRING".into()));
        assert_eq!(request.query_pairs().last().unwrap(), &("promoCode", "SPRING".to_string()));
    }

    #[test]
    fn only_card_is_enabled() {
        assert!(PaymentMethod::Card.is_enabled());
        assert!(!PaymentMethod::Paypal.is_enabled());
        assert_eq!("PayPal".parse::<PaymentMethod>(), Ok(PaymentMethod::Paypal));
    }
}
