//! Booking draft store.
//!
//! Holds the single in-progress ticket selection between the event page and
//! the payment screen. Creating a draft replaces whatever was stored before,
//! so at most one booking is active per session.

use crate::error::{DraftError, StorageError};
use crate::pricing::Pricing;
use crate::storage::{ClientStorage, BOOKING_KEY};
use crate::types::{BookingDraft, EventDetail, EventId, Money};
use std::sync::Arc;

/// Reads and writes the `currentBooking` entry
#[derive(Clone)]
pub struct BookingDraftStore {
    storage: Arc<dyn ClientStorage>,
    pricing: Pricing,
}

impl BookingDraftStore {
    /// Create a store over `storage` using `pricing` for amounts
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>, pricing: Pricing) -> Self {
        Self { storage, pricing }
    }

    /// Fee and tax parameters used for new drafts
    #[must_use]
    pub const fn pricing(&self) -> Pricing {
        self.pricing
    }

    /// Compute and persist a draft
    ///
    /// # Errors
    ///
    /// - [`DraftError::InvalidQuantity`] if `quantity` is zero
    /// - [`DraftError::AmountOverflow`] if the amounts overflow
    /// - [`DraftError::Storage`] if the draft cannot be saved
    pub fn create(
        &self,
        event_id: EventId,
        ticket_type: impl Into<String>,
        quantity: u32,
        unit_price: Money,
        currency: impl Into<String>,
        free: bool,
    ) -> Result<BookingDraft, DraftError> {
        if quantity == 0 {
            return Err(DraftError::InvalidQuantity);
        }

        let quote = self
            .pricing
            .quote(unit_price, quantity, free)
            .ok_or(DraftError::AmountOverflow)?;

        let draft = BookingDraft {
            event_id,
            ticket_type: ticket_type.into(),
            quantity,
            currency: currency.into(),
            free,
            price: quote.price,
            fees: quote.fees,
            vat: quote.vat,
            total: quote.total,
        };

        let serialized = serde_json::to_string(&draft).map_err(StorageError::from)?;
        self.storage.set(BOOKING_KEY, &serialized)?;

        tracing::info!(
            event_id = %draft.event_id,
            ticket_type = %draft.ticket_type,
            quantity = draft.quantity,
            total = %draft.total,
            "Booking draft created"
        );

        Ok(draft)
    }

    /// Validate a selection against the event and persist it
    ///
    /// # Errors
    ///
    /// - [`DraftError::UnknownTicketType`] if the event has no such tier
    /// - [`DraftError::NotEnoughTickets`] if fewer tickets remain than requested
    /// - anything [`BookingDraftStore::create`] returns
    pub fn select(
        &self,
        event: &EventDetail,
        ticket_type: &str,
        quantity: u32,
    ) -> Result<BookingDraft, DraftError> {
        let tier = event
            .ticket_type(ticket_type)
            .ok_or_else(|| DraftError::UnknownTicketType(ticket_type.to_string()))?;

        if quantity == 0 {
            return Err(DraftError::InvalidQuantity);
        }

        if let Some(remaining) = tier.remaining {
            if quantity > remaining {
                return Err(DraftError::NotEnoughTickets {
                    ticket_type: tier.name.clone(),
                    requested: quantity,
                    remaining,
                });
            }
        }

        self.create(
            event.id.clone(),
            tier.name.clone(),
            quantity,
            tier.price,
            event.currency.clone(),
            event.is_free_event,
        )
    }

    /// The current draft, or `None` if there is none or it is unreadable
    ///
    /// An unreadable draft is removed so it cannot resurface later.
    #[must_use]
    pub fn read(&self) -> Option<BookingDraft> {
        let raw = match self.storage.get(BOOKING_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(error) => {
                tracing::warn!(error = %error, "Could not read booking draft");
                return None;
            },
        };

        match serde_json::from_str::<BookingDraft>(&raw) {
            Ok(draft) if draft.quantity > 0 => Some(draft),
            Ok(_) => {
                tracing::warn!("Discarding booking draft with zero quantity");
                self.discard();
                None
            },
            Err(error) => {
                tracing::warn!(error = %error, "Discarding corrupt booking draft");
                self.discard();
                None
            },
        }
    }

    /// The current draft if it belongs to `event_id`
    ///
    /// # Errors
    ///
    /// - [`DraftError::NotFound`] if no readable draft is stored
    /// - [`DraftError::Stale`] if the draft is for another event
    pub fn read_for(&self, event_id: &EventId) -> Result<BookingDraft, DraftError> {
        let draft = self.read().ok_or(DraftError::NotFound)?;
        if draft.is_for(event_id) {
            Ok(draft)
        } else {
            Err(DraftError::Stale {
                expected: event_id.clone(),
                found: draft.event_id,
            })
        }
    }

    /// Remove the draft
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the storage cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(BOOKING_KEY)?;
        tracing::debug!("Booking draft cleared");
        Ok(())
    }

    fn discard(&self) {
        if let Err(error) = self.storage.remove(BOOKING_KEY) {
            tracing::warn!(error = %error, "Could not remove unreadable booking draft");
        }
    }
}

impl std::fmt::Debug for BookingDraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingDraftStore")
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}
