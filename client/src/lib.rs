//! # Box Office Client
//!
//! The booking flow of the Box Office ticketing app, from ticket selection to
//! purchase confirmation:
//!
//! - **Booking draft store**: the persisted, priced ticket selection
//! - **Reservation timer**: a five-minute countdown that purges the draft
//! - **Checkout submitter**: local validation, one purchase in flight, QR confirmation
//! - **Session guard**: token and capability checks before protected areas
//!
//! Payment, ticket allocation and authorization are enforced by the backend;
//! everything here is the client side of that conversation.
//!
//! ## Example
//!
//! ```no_run
//! use boxoffice_client::{
//!     BookingDraftStore, CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutState,
//!     EventId, HttpBackend, MemoryStorage, Pricing, SessionGuard,
//! };
//! use boxoffice_core::environment::SystemClock;
//! use boxoffice_runtime::Store;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(MemoryStorage::new());
//!     let clock = Arc::new(SystemClock);
//!     let env = CheckoutEnvironment::new(
//!         clock.clone(),
//!         BookingDraftStore::new(storage.clone(), Pricing::default()),
//!         SessionGuard::new(storage, clock),
//!         Arc::new(HttpBackend::new("http://localhost:8080", Duration::from_secs(30))?),
//!     );
//!
//!     let store = Store::new(CheckoutState::new(), CheckoutReducer::new(), env);
//!     store
//!         .send(CheckoutAction::ScreenMounted { event_id: EventId::new("7") })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod aggregates;
pub mod backend;
pub mod config;
pub mod confirmation;
pub mod draft;
pub mod error;
pub mod event_page;
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;
pub mod pricing;
pub mod reservation;
pub mod session;
pub mod storage;
pub mod types;

// Re-export main types for convenience
pub use aggregates::checkout::{Submission, TIMER};
pub use aggregates::{CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutState};
pub use backend::{HttpBackend, TicketingBackend};
pub use config::Config;
pub use confirmation::TicketConfirmation;
pub use draft::BookingDraftStore;
pub use error::{BackendError, CheckoutError, DraftError, StorageError};
pub use event_page::{EventPage, EventView};
pub use pricing::{Pricing, Quote};
pub use reservation::{ReservationWindow, TickOutcome};
pub use session::{Access, Area, SessionGuard, TokenClaims};
pub use storage::{ClientStorage, FileStorage, MemoryStorage};
pub use types::{
    BookingDraft, EventDetail, EventId, Money, Notice, PaymentMethod, PurchaseRequest, Route,
    TicketType, UserProfile,
};
