//! Event detail screen.
//!
//! Loads an event with its publisher's contact details and turns a ticket
//! selection into the booking draft the checkout screen consumes.

use crate::backend::{BackendResult, TicketingBackend};
use crate::draft::BookingDraftStore;
use crate::error::DraftError;
use crate::session::SessionGuard;
use crate::types::{BookingDraft, EventDetail, EventId, UserProfile};
use std::sync::Arc;

/// Everything the event screen shows
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventView {
    /// The event
    pub event: EventDetail,
    /// Publisher contact details, when they could be loaded
    pub publisher: Option<UserProfile>,
    /// The stored draft, only if it belongs to this event
    pub draft: Option<BookingDraft>,
}

impl EventView {
    /// Whether the "Proceed to checkout" action is enabled
    #[must_use]
    pub const fn can_checkout(&self) -> bool {
        self.draft.is_some()
    }
}

/// Backs the event detail screen
#[derive(Clone)]
pub struct EventPage {
    backend: Arc<dyn TicketingBackend>,
    drafts: BookingDraftStore,
    session: SessionGuard,
}

impl EventPage {
    /// Creates a new `EventPage`
    #[must_use]
    pub fn new(
        backend: Arc<dyn TicketingBackend>,
        drafts: BookingDraftStore,
        session: SessionGuard,
    ) -> Self {
        Self {
            backend,
            drafts,
            session,
        }
    }

    /// Load the event
    ///
    /// The publisher profile needs a signed-in user; when it cannot be
    /// fetched the view is still returned without it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::BackendError`] if the event itself cannot be loaded.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self, event_id: EventId) -> BackendResult<EventView> {
        let token = self.session.bearer();
        let event = self.backend.fetch_event(event_id.clone(), token.clone()).await?;

        let publisher = match (event.publisher_email.clone(), token) {
            (Some(email), Some(token)) => match self.backend.fetch_user(email, token).await {
                Ok(profile) => Some(profile),
                Err(error) => {
                    tracing::warn!(error = %error, "Could not load publisher contact");
                    None
                },
            },
            _ => None,
        };

        let draft = match self.drafts.read_for(&event_id) {
            Ok(draft) => Some(draft),
            Err(DraftError::Stale { found, .. }) => {
                tracing::debug!(draft_event = %found, "Ignoring booking draft for another event");
                None
            },
            Err(_) => None,
        };

        Ok(EventView {
            event,
            publisher,
            draft,
        })
    }

    /// Reserve tickets: validate the selection and store it as the draft
    ///
    /// # Errors
    ///
    /// Returns [`DraftError`] if the tier is unknown, the quantity is invalid
    /// or exceeds what is left, or the draft cannot be saved.
    pub fn reserve(
        &self,
        view: &mut EventView,
        ticket_type: &str,
        quantity: u32,
    ) -> Result<BookingDraft, DraftError> {
        let draft = self.drafts.select(&view.event, ticket_type, quantity)?;
        view.draft = Some(draft.clone());
        Ok(draft)
    }
}

impl std::fmt::Debug for EventPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPage")
            .field("drafts", &self.drafts)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::mocks::{BackendCall, MockBackend};
    use crate::pricing::Pricing;
    use crate::session::unsigned_token;
    use crate::storage::{ClientStorage, MemoryStorage, TOKEN_KEY};
    use crate::types::{Money, TicketType};
    use boxoffice_testing::{test_clock, test_epoch};
    use serde_json::json;

    fn jazz_night() -> EventDetail {
        EventDetail {
            id: EventId::new("7"),
            title: "Jazz Night".to_string(),
            currency: "USD".to_string(),
            is_free_event: false,
            ticket_types: vec![TicketType {
                name: "VIP".to_string(),
                price: Money::from_cents(10_000),
                remaining: Some(10),
            }],
            publisher_email: Some("host@example.com".to_string()),
        }
    }

    fn page(backend: MockBackend, signed_in: bool) -> (EventPage, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        if signed_in {
            let token = unsigned_token(&json!({"exp": test_epoch().timestamp() + 60}));
            storage.set(TOKEN_KEY, &token).unwrap();
        }
        let drafts = BookingDraftStore::new(storage.clone(), Pricing::default());
        let session = SessionGuard::new(storage.clone(), Arc::new(test_clock()));
        (EventPage::new(Arc::new(backend), drafts, session), storage)
    }

    #[tokio::test]
    async fn load_includes_publisher_contact() {
        let backend = MockBackend::new().with_event(jazz_night()).with_user(UserProfile {
            email: "host@example.com".to_string(),
            name: Some("Host".to_string()),
            phone: None,
        });
        let (page, _) = page(backend, true);

        let view = page.load(EventId::new("7")).await.unwrap();

        assert_eq!(view.publisher.as_ref().unwrap().name.as_deref(), Some("Host"));
        assert!(!view.can_checkout());
    }

    #[tokio::test]
    async fn missing_publisher_profile_is_not_fatal() {
        let backend = MockBackend::new().with_event(jazz_night());
        let (page, _) = page(backend.clone(), true);

        let view = page.load(EventId::new("7")).await.unwrap();

        assert!(view.publisher.is_none());
        assert!(backend
            .calls()
            .contains(&BackendCall::FetchUser { email: "host@example.com".to_string() }));
    }

    #[tokio::test]
    async fn anonymous_visitors_skip_the_profile_lookup() {
        let backend = MockBackend::new().with_event(jazz_night());
        let (page, _) = page(backend.clone(), false);

        page.load(EventId::new("7")).await.unwrap();

        assert_eq!(
            backend.calls(),
            vec![BackendCall::FetchEvent {
                event_id: EventId::new("7"),
                authenticated: false,
            }]
        );
    }

    #[tokio::test]
    async fn unknown_event_is_an_error() {
        let (page, _) = page(MockBackend::new(), true);
        assert_eq!(page.load(EventId::new("9")).await, Err(BackendError::NotFound));
    }

    #[tokio::test]
    async fn reserve_enables_checkout_for_this_event_only() {
        let mut other = jazz_night();
        other.id = EventId::new("8");
        let backend = MockBackend::new().with_event(jazz_night()).with_event(other);
        let (page, _) = page(backend, false);

        let mut view = page.load(EventId::new("7")).await.unwrap();
        let draft = page.reserve(&mut view, "VIP", 2).unwrap();
        assert_eq!(draft.total, Money::from_cents(23_400));
        assert!(view.can_checkout());

        let reloaded = page.load(EventId::new("7")).await.unwrap();
        assert!(reloaded.can_checkout());

        let elsewhere = page.load(EventId::new("8")).await.unwrap();
        assert!(!elsewhere.can_checkout());
    }

    #[tokio::test]
    async fn reserve_rejects_more_than_remaining() {
        let (page, _) = page(MockBackend::new().with_event(jazz_night()), false);
        let mut view = page.load(EventId::new("7")).await.unwrap();

        let result = page.reserve(&mut view, "VIP", 11);

        assert!(matches!(result, Err(DraftError::NotEnoughTickets { remaining: 10, .. })));
        assert!(!view.can_checkout());
    }
}
