//! Checkout reducer for the payment confirmation screen.
//!
//! Hosts two cooperating state machines:
//! 1. The reservation countdown, started when the screen mounts with a usable
//!    draft and driven by one cancellable `Tick` per second
//! 2. The purchase submitter, which validates locally, keeps at most one
//!    purchase in flight, and turns the backend reply into a confirmation
//!
//! When the countdown runs out the draft is purged and a blocking notice is
//! shown; the only way out is `ReturnHome`. An expired sign-in, found at mount
//! or at submit, shows its own notice and redirects to login shortly after.

use crate::backend::TicketingBackend;
use crate::confirmation::TicketConfirmation;
use crate::draft::BookingDraftStore;
use crate::error::CheckoutError;
use crate::reservation::{ReservationWindow, TickOutcome, RESERVATION_SECONDS};
use crate::session::{Access, Area, SessionGuard};
use crate::types::{BookingDraft, EventId, Notice, PaymentMethod, PurchaseRequest, Route};
use boxoffice_core::effect::{Effect, EffectId};
use boxoffice_core::environment::Clock;
use boxoffice_core::reducer::Reducer;
use boxoffice_core::{smallvec, DateTime, SmallVec, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Id the countdown ticks are registered under
pub const TIMER: EffectId = EffectId::new("checkout.reservation_timer");

// ============================================================================
// State
// ============================================================================

/// Progress of the purchase request
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Submission {
    /// Nothing sent yet
    #[default]
    Idle,
    /// A purchase request is awaiting its reply
    InFlight {
        /// Identifies the attempt so stray replies can be ignored
        attempt_id: Uuid,
    },
    /// The backend accepted the purchase
    Succeeded {
        /// Response body as returned by the backend
        receipt: serde_json::Value,
        /// QR rendering of `receipt`, absent if it could not be encoded
        confirmation: Option<TicketConfirmation>,
        /// When the reply arrived
        completed_at: DateTime<Utc>,
    },
    /// The backend rejected the purchase or could not be reached
    Failed {
        /// What went wrong
        error: CheckoutError,
    },
}

/// State of the payment confirmation screen
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutState {
    /// Event the screen was opened for
    pub event_id: Option<EventId>,
    /// Draft loaded at mount, cleared on expiry or dismissal
    pub draft: Option<BookingDraft>,
    /// Reservation countdown
    pub window: ReservationWindow,
    /// Whether ticks are scheduled
    pub timer_running: bool,
    /// Terms of service checkbox
    pub terms_accepted: bool,
    /// Resale policy checkbox
    pub resale_policy_accepted: bool,
    /// Selected payment method
    pub payment_method: PaymentMethod,
    /// Promo code as typed
    pub promo_code: String,
    /// Purchase progress
    pub submission: Submission,
    /// Last local validation failure
    pub validation_error: Option<CheckoutError>,
    /// Blocking notice, if any
    pub notice: Option<Notice>,
    /// Expiry happened mid-purchase; show the notice once the reply lands
    pub expiry_notice_deferred: bool,
    /// Navigation requested by the reducer
    pub route: Option<Route>,
}

impl Default for CheckoutState {
    fn default() -> Self {
        Self {
            event_id: None,
            draft: None,
            window: ReservationWindow::standard(),
            timer_running: false,
            terms_accepted: false,
            resale_policy_accepted: false,
            payment_method: PaymentMethod::default(),
            promo_code: String::new(),
            submission: Submission::Idle,
            validation_error: None,
            notice: None,
            expiry_notice_deferred: false,
            route: None,
        }
    }
}

impl CheckoutState {
    /// Creates an unmounted checkout state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Label of the submit button
    #[must_use]
    pub fn submit_label(&self) -> &'static str {
        if self.draft.as_ref().is_some_and(|draft| draft.free) {
            "Confirm Booking"
        } else {
            "Proceed to Payment"
        }
    }

    /// Whether a purchase request is awaiting its reply
    #[must_use]
    pub const fn is_submitting(&self) -> bool {
        matches!(self.submission, Submission::InFlight { .. })
    }

    /// Whether the submit button is enabled
    #[must_use]
    pub const fn can_submit(&self) -> bool {
        self.draft.is_some()
            && self.terms_accepted
            && self.resale_policy_accepted
            && matches!(self.submission, Submission::Idle | Submission::Failed { .. })
            && !self.window.is_expired()
            && !matches!(self.notice, Some(Notice::SessionExpired))
    }

    /// The confirmation code after a successful purchase
    #[must_use]
    pub fn confirmation(&self) -> Option<&TicketConfirmation> {
        match &self.submission {
            Submission::Succeeded { confirmation, .. } => confirmation.as_ref(),
            _ => None,
        }
    }

    /// Message to show for the current failure, if any
    #[must_use]
    pub fn error_message(&self) -> Option<&'static str> {
        match (&self.validation_error, &self.submission) {
            (Some(error), _) | (None, Submission::Failed { error }) => Some(error.user_message()),
            _ => None,
        }
    }

    fn stop_timer(&mut self) -> Effect<CheckoutAction> {
        self.timer_running = false;
        Effect::Cancel(TIMER)
    }

    fn show_deferred_expiry(&mut self) {
        if self.expiry_notice_deferred {
            self.expiry_notice_deferred = false;
            self.notice = Some(Notice::ReservationExpired);
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Inputs to the checkout screen
#[derive(Clone, Debug)]
pub enum CheckoutAction {
    /// The screen opened for an event
    ScreenMounted {
        /// Event being checked out
        event_id: EventId,
    },
    /// The screen closed
    ScreenUnmounted,
    /// One second of the reservation window elapsed
    Tick,
    /// Terms of service checkbox changed
    TermsAccepted(bool),
    /// Resale policy checkbox changed
    ResalePolicyAccepted(bool),
    /// Payment method changed
    PaymentMethodSelected(PaymentMethod),
    /// Promo code field changed
    PromoCodeEntered(String),
    /// Submit button pressed
    Submit,
    /// The backend accepted the purchase
    PurchaseSucceeded {
        /// Attempt the reply belongs to
        attempt_id: Uuid,
        /// Response body
        payload: serde_json::Value,
    },
    /// The purchase request failed
    PurchaseFailed {
        /// Attempt the reply belongs to
        attempt_id: Uuid,
        /// Failure description
        reason: String,
    },
    /// The user closed the confirmation
    ConfirmationDismissed,
    /// "Return to Home" pressed
    ReturnHome,
    /// The session-expired notice has been up long enough; go to login
    LoginRedirectDue,
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the checkout screen
#[derive(Clone)]
pub struct CheckoutEnvironment {
    /// Clock for completion timestamps
    pub clock: Arc<dyn Clock>,
    /// Persisted booking draft
    pub drafts: BookingDraftStore,
    /// Token checks
    pub session: SessionGuard,
    /// Purchase endpoint
    pub backend: Arc<dyn TicketingBackend>,
    /// Interval between countdown ticks
    pub tick: Duration,
    /// Length of the reservation window in ticks
    pub window_seconds: u32,
}

impl CheckoutEnvironment {
    /// Creates a new `CheckoutEnvironment` with the standard window
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        drafts: BookingDraftStore,
        session: SessionGuard,
        backend: Arc<dyn TicketingBackend>,
    ) -> Self {
        Self {
            clock,
            drafts,
            session,
            backend,
            tick: Duration::from_secs(1),
            window_seconds: RESERVATION_SECONDS,
        }
    }

    /// Use a window of `seconds`
    #[must_use]
    pub fn with_window_seconds(mut self, seconds: u32) -> Self {
        self.window_seconds = seconds;
        self
    }

    fn next_tick(&self) -> Effect<CheckoutAction> {
        Effect::Delay {
            duration: self.tick,
            action: Box::new(CheckoutAction::Tick),
        }
        .cancellable(TIMER)
    }
}

impl std::fmt::Debug for CheckoutEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutEnvironment")
            .field("drafts", &self.drafts)
            .field("session", &self.session)
            .field("tick", &self.tick)
            .field("window_seconds", &self.window_seconds)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the payment confirmation screen
#[derive(Clone, Debug, Default)]
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Creates a new `CheckoutReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Local checks run before anything is sent
    ///
    /// Returns the draft to purchase and the bearer token.
    fn validate_submit(
        state: &CheckoutState,
        env: &CheckoutEnvironment,
    ) -> Result<(BookingDraft, String), CheckoutError> {
        if !state.terms_accepted {
            return Err(CheckoutError::TermsNotAccepted);
        }
        if !state.resale_policy_accepted {
            return Err(CheckoutError::ResalePolicyNotAccepted);
        }

        let token = match env.session.authorize(Area::Checkout) {
            Ok(token) => token,
            Err(Access::SessionExpired { .. }) => return Err(CheckoutError::SessionExpired),
            Err(_) => return Err(CheckoutError::Unauthenticated),
        };

        let event_id = state.event_id.as_ref().ok_or(CheckoutError::MissingDraft)?;
        let draft = env.drafts.read_for(event_id)?;

        if draft.quantity == 0 {
            return Err(CheckoutError::InvalidQuantity);
        }
        if !state.payment_method.is_enabled() {
            return Err(CheckoutError::PaymentMethodUnavailable(state.payment_method));
        }

        Ok((draft, token))
    }

    fn mount(
        state: &mut CheckoutState,
        event_id: EventId,
        env: &CheckoutEnvironment,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        *state = CheckoutState {
            window: ReservationWindow::new(env.window_seconds),
            ..CheckoutState::default()
        };

        if let Access::SessionExpired { redirect_after } = env.session.check(Area::Checkout) {
            state.event_id = Some(event_id);
            return Self::expire_session(state, redirect_after);
        }

        let draft = env.drafts.read_for(&event_id);
        state.event_id = Some(event_id);

        match draft {
            Ok(draft) => {
                tracing::info!(
                    event_id = %draft.event_id,
                    seconds = env.window_seconds,
                    "Reservation window started"
                );
                state.draft = Some(draft);
                state.timer_running = true;
                smallvec![Effect::Cancel(TIMER), env.next_tick()]
            },
            Err(error) => {
                tracing::warn!(error = %error, "No usable booking draft at checkout");
                state.validation_error = Some(CheckoutError::from(error));
                smallvec![Effect::Cancel(TIMER)]
            },
        }
    }

    /// Show the session-expired notice and schedule the login redirect
    fn expire_session(
        state: &mut CheckoutState,
        redirect_after: Duration,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        tracing::info!(event_id = ?state.event_id, "Session expired at checkout");
        state.validation_error = Some(CheckoutError::SessionExpired);
        state.notice = Some(Notice::SessionExpired);
        smallvec![
            state.stop_timer(),
            Effect::Delay {
                duration: redirect_after,
                action: Box::new(CheckoutAction::LoginRedirectDue),
            },
        ]
    }

    fn tick(
        state: &mut CheckoutState,
        env: &CheckoutEnvironment,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        if !state.timer_running {
            return SmallVec::new();
        }

        match state.window.tick() {
            TickOutcome::Counting(_) => smallvec![env.next_tick()],
            TickOutcome::Expired => {
                tracing::info!(event_id = ?state.event_id, "Reservation window expired");
                if let Err(error) = env.drafts.clear() {
                    tracing::warn!(error = %error, "Could not clear expired booking draft");
                }
                state.draft = None;

                if state.is_submitting() {
                    state.expiry_notice_deferred = true;
                } else {
                    state.notice = Some(Notice::ReservationExpired);
                }
                smallvec![state.stop_timer()]
            },
            TickOutcome::AlreadyExpired => SmallVec::new(),
        }
    }

    fn submit(
        state: &mut CheckoutState,
        env: &CheckoutEnvironment,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        match &state.submission {
            Submission::InFlight { attempt_id } => {
                tracing::debug!(%attempt_id, "Ignoring submit while a purchase is in flight");
                return SmallVec::new();
            },
            Submission::Succeeded { .. } => {
                tracing::debug!("Ignoring submit after a completed purchase");
                return SmallVec::new();
            },
            Submission::Idle | Submission::Failed { .. } => {},
        }

        if state.notice == Some(Notice::SessionExpired) {
            tracing::debug!("Ignoring submit while the session-expired notice is up");
            return SmallVec::new();
        }

        if state.window.is_expired() {
            state.validation_error = Some(CheckoutError::ReservationExpired);
            state.notice = Some(Notice::ReservationExpired);
            return SmallVec::new();
        }

        let (draft, token) = match Self::validate_submit(state, env) {
            Ok(valid) => valid,
            Err(CheckoutError::SessionExpired) => {
                return Self::expire_session(state, env.session.expired_redirect_delay());
            },
            Err(error) => {
                tracing::debug!(error = %error, "Checkout blocked");
                if let Some(route) = error.redirect() {
                    state.route = Some(route);
                }
                state.validation_error = Some(error);
                return SmallVec::new();
            },
        };

        let attempt_id = Uuid::new_v4();
        let request = PurchaseRequest::from_draft(
            &draft,
            state.payment_method,
            Some(state.promo_code.clone()),
        );
        state.draft = Some(draft);
        state.validation_error = None;
        state.submission = Submission::InFlight { attempt_id };

        let backend = Arc::clone(&env.backend);
        smallvec![Effect::Future(Box::pin(async move {
            match backend.purchase(request, token).await {
                Ok(payload) => Some(CheckoutAction::PurchaseSucceeded {
                    attempt_id,
                    payload,
                }),
                Err(error) => {
                    tracing::warn!(%attempt_id, error = %error, "Purchase failed");
                    Some(CheckoutAction::PurchaseFailed {
                        attempt_id,
                        reason: error.to_string(),
                    })
                },
            }
        }))]
    }

    fn is_current_attempt(state: &CheckoutState, attempt_id: Uuid) -> bool {
        let current = matches!(
            state.submission,
            Submission::InFlight { attempt_id: current } if current == attempt_id
        );
        if !current {
            tracing::warn!(%attempt_id, "Ignoring reply for a stale purchase attempt");
        }
        current
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            CheckoutAction::ScreenMounted { event_id } => Self::mount(state, event_id, env),

            CheckoutAction::ScreenUnmounted => smallvec![state.stop_timer()],

            CheckoutAction::Tick => Self::tick(state, env),

            CheckoutAction::TermsAccepted(accepted) => {
                state.terms_accepted = accepted;
                state.validation_error = None;
                SmallVec::new()
            },

            CheckoutAction::ResalePolicyAccepted(accepted) => {
                state.resale_policy_accepted = accepted;
                state.validation_error = None;
                SmallVec::new()
            },

            CheckoutAction::PaymentMethodSelected(method) => {
                if method.is_enabled() {
                    state.payment_method = method;
                    state.validation_error = None;
                } else {
                    state.validation_error = Some(CheckoutError::PaymentMethodUnavailable(method));
                }
                SmallVec::new()
            },

            CheckoutAction::PromoCodeEntered(code) => {
                state.promo_code = code;
                SmallVec::new()
            },

            CheckoutAction::Submit => Self::submit(state, env),

            CheckoutAction::PurchaseSucceeded {
                attempt_id,
                payload,
            } => {
                if !Self::is_current_attempt(state, attempt_id) {
                    return SmallVec::new();
                }

                let confirmation = match TicketConfirmation::from_payload(&payload) {
                    Ok(confirmation) => Some(confirmation),
                    Err(error) => {
                        tracing::warn!(error = %error, "Purchase succeeded but the receipt cannot be shown as a code");
                        None
                    },
                };
                tracing::info!(%attempt_id, "Purchase completed");

                // The screen keeps its copy for display; a stored draft could be bought twice
                if let Err(error) = env.drafts.clear() {
                    tracing::warn!(error = %error, "Could not clear purchased booking draft");
                }

                state.submission = Submission::Succeeded {
                    receipt: payload,
                    confirmation,
                    completed_at: env.clock.now(),
                };
                state.show_deferred_expiry();
                smallvec![state.stop_timer()]
            },

            CheckoutAction::PurchaseFailed { attempt_id, reason } => {
                if !Self::is_current_attempt(state, attempt_id) {
                    return SmallVec::new();
                }
                state.submission = Submission::Failed {
                    error: CheckoutError::PurchaseFailed(reason),
                };
                state.show_deferred_expiry();
                SmallVec::new()
            },

            CheckoutAction::ConfirmationDismissed => {
                if !matches!(state.submission, Submission::Succeeded { .. }) {
                    return SmallVec::new();
                }
                state.draft = None;
                state.route = Some(Route::Home);
                SmallVec::new()
            },

            CheckoutAction::ReturnHome => {
                state.notice = None;
                state.route = Some(Route::Home);
                smallvec![state.stop_timer()]
            },

            CheckoutAction::LoginRedirectDue => {
                // A remount since the notice went up supersedes the redirect
                if state.notice == Some(Notice::SessionExpired) {
                    state.route = Some(Route::Login);
                }
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mocks::MockBackend;
    use crate::pricing::Pricing;
    use crate::session::unsigned_token;
    use crate::storage::{ClientStorage, MemoryStorage, TOKEN_KEY};
    use crate::types::Money;
    use boxoffice_testing::{assertions, test_clock, test_epoch, ReducerTest};
    use serde_json::json;

    struct Fixture {
        env: CheckoutEnvironment,
        storage: Arc<MemoryStorage>,
    }

    fn fixture(signed_in: bool) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        if signed_in {
            let token = unsigned_token(&json!({"exp": test_epoch().timestamp() + 3600}));
            storage.set(TOKEN_KEY, &token).unwrap();
        }
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let drafts = BookingDraftStore::new(storage.clone(), Pricing::default());
        let session = SessionGuard::new(storage.clone(), clock.clone());
        let env = CheckoutEnvironment::new(clock, drafts, session, Arc::new(MockBackend::new()));
        Fixture { env, storage }
    }

    fn with_draft(fixture: &Fixture, event: &str, free: bool) -> BookingDraft {
        fixture
            .env
            .drafts
            .create(EventId::new(event), "VIP", 2, Money::from_cents(10_000), "USD", free)
            .unwrap()
    }

    fn mounted(fixture: &Fixture, event: &str) -> CheckoutState {
        let mut state = CheckoutState::new();
        let _ = CheckoutReducer::new().reduce(
            &mut state,
            CheckoutAction::ScreenMounted {
                event_id: EventId::new(event),
            },
            &fixture.env,
        );
        state
    }

    fn ready(fixture: &Fixture, event: &str) -> CheckoutState {
        let mut state = mounted(fixture, event);
        state.terms_accepted = true;
        state.resale_policy_accepted = true;
        state
    }

    #[test]
    fn mount_with_draft_starts_timer() {
        let fixture = fixture(true);
        let draft = with_draft(&fixture, "7", false);

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(CheckoutState::new())
            .when_action(CheckoutAction::ScreenMounted {
                event_id: EventId::new("7"),
            })
            .then_state(move |state| {
                assert_eq!(state.draft.as_ref(), Some(&draft));
                assert!(state.timer_running);
                assert_eq!(state.window.remaining_seconds(), 300);
                assert_eq!(state.submit_label(), "Proceed to Payment");
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_cancels(effects, TIMER);
                assertions::assert_has_delay_effect(effects);
            })
            .run();
    }

    #[test]
    fn mount_with_stale_draft_blocks_checkout() {
        let fixture = fixture(true);
        with_draft(&fixture, "other", false);

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(CheckoutState::new())
            .when_action(CheckoutAction::ScreenMounted {
                event_id: EventId::new("7"),
            })
            .when_action(CheckoutAction::TermsAccepted(true))
            .when_action(CheckoutAction::ResalePolicyAccepted(true))
            .then_state(|state| {
                assert!(state.draft.is_none());
                assert!(!state.timer_running);
                assert!(!state.can_submit());
            })
            .run();
    }

    #[test]
    fn mount_without_draft_reports_missing_booking() {
        let fixture = fixture(true);

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(CheckoutState::new())
            .when_action(CheckoutAction::ScreenMounted {
                event_id: EventId::new("7"),
            })
            .then_state(|state| {
                assert_eq!(state.validation_error, Some(CheckoutError::MissingDraft));
                assert!(state.error_message().is_some());
            })
            .then_effects(assertions::assert_no_delay_effect)
            .run();
    }

    #[test]
    fn free_event_uses_confirm_label() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", true);

        let state = mounted(&fixture, "7");

        assert_eq!(state.submit_label(), "Confirm Booking");
        assert!(state.draft.unwrap().total.is_zero());
    }

    #[test]
    fn last_tick_expires_and_purges_draft() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let mut state = mounted(&fixture, "7");
        let reducer = CheckoutReducer::new();

        for _ in 0..300 {
            let effects = reducer.reduce(&mut state, CheckoutAction::Tick, &fixture.env);
            assert!(effects[0].is_delay());
        }
        assert_eq!(state.window.remaining_seconds(), 0);
        assert!(state.notice.is_none());

        let effects = reducer.reduce(&mut state, CheckoutAction::Tick, &fixture.env);

        assertions::assert_cancels(&effects, TIMER);
        assert_eq!(state.notice, Some(Notice::ReservationExpired));
        assert!(state.window.is_expired());
        assert!(state.draft.is_none());
        assert_eq!(fixture.env.drafts.read(), None);

        let effects = reducer.reduce(&mut state, CheckoutAction::Tick, &fixture.env);
        assertions::assert_no_effects(&effects);
    }

    #[test]
    fn submit_after_expiry_is_blocked() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let mut state = ready(&fixture, "7");
        state.window = ReservationWindow::new(0);
        state.window.tick();

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::Submit)
            .then_state(|state| {
                assert_eq!(state.validation_error, Some(CheckoutError::ReservationExpired));
                assert_eq!(state.submission, Submission::Idle);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn checkboxes_are_validated_in_order() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let state = mounted(&fixture, "7");

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state.clone())
            .when_action(CheckoutAction::Submit)
            .then_state(|state| {
                assert_eq!(state.validation_error, Some(CheckoutError::TermsNotAccepted));
            })
            .then_effects(assertions::assert_no_effects)
            .run();

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::TermsAccepted(true))
            .when_action(CheckoutAction::Submit)
            .then_state(|state| {
                assert_eq!(
                    state.validation_error,
                    Some(CheckoutError::ResalePolicyNotAccepted)
                );
            })
            .run();
    }

    #[test]
    fn unauthenticated_submit_routes_to_sign_up() {
        let fixture = fixture(false);
        with_draft(&fixture, "7", false);
        let state = ready(&fixture, "7");

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::Submit)
            .then_state(|state| {
                assert_eq!(state.validation_error, Some(CheckoutError::Unauthenticated));
                assert_eq!(state.route, Some(Route::SignUp));
                assert_eq!(state.submission, Submission::Idle);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn draft_replaced_for_another_event_is_stale_at_submit() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let state = ready(&fixture, "7");
        with_draft(&fixture, "8", false);

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::Submit)
            .then_state(|state| {
                assert_eq!(state.validation_error, Some(CheckoutError::StaleDraft));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn paypal_is_refused() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let mut state = ready(&fixture, "7");

        let reducer = CheckoutReducer::new();
        let _ = reducer.reduce(
            &mut state,
            CheckoutAction::PaymentMethodSelected(PaymentMethod::Paypal),
            &fixture.env,
        );
        assert_eq!(state.payment_method, PaymentMethod::Card);
        assert_eq!(
            state.validation_error,
            Some(CheckoutError::PaymentMethodUnavailable(PaymentMethod::Paypal))
        );

        // A forced selection is still caught at submit
        state.payment_method = PaymentMethod::Paypal;
        let effects = reducer.reduce(&mut state, CheckoutAction::Submit, &fixture.env);
        assertions::assert_no_effects(&effects);
        assert_eq!(
            state.validation_error,
            Some(CheckoutError::PaymentMethodUnavailable(PaymentMethod::Paypal))
        );
    }

    #[test]
    fn valid_submit_sends_one_purchase() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let state = ready(&fixture, "7");

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::PromoCodeEntered("SPRING".into()))
            .when_action(CheckoutAction::Submit)
            .then_state(|state| {
                assert!(state.is_submitting());
                assert!(!state.can_submit());
                assert_eq!(state.validation_error, None);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn duplicate_submit_is_ignored() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let state = ready(&fixture, "7");

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::Submit)
            .when_action(CheckoutAction::Submit)
            .then_state(|state| assert!(state.is_submitting()))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn success_stops_timer_and_clears_stored_draft() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let mut state = ready(&fixture, "7");
        let attempt_id = Uuid::new_v4();
        state.submission = Submission::InFlight { attempt_id };

        let storage = fixture.storage.clone();
        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::PurchaseSucceeded {
                attempt_id,
                payload: json!({"ticketIds": [1, 2]}),
            })
            .then_state(move |state| {
                assert!(state.confirmation().is_some());
                assert!(!state.timer_running);
                assert!(state.draft.is_some());
                assert_eq!(storage.get(crate::storage::BOOKING_KEY).unwrap(), None);
                match &state.submission {
                    Submission::Succeeded { completed_at, .. } => {
                        assert_eq!(*completed_at, test_epoch());
                    },
                    other => panic!("expected success, got {other:?}"),
                }
            })
            .then_effects(|effects| assertions::assert_cancels(effects, TIMER))
            .run();
    }

    #[test]
    fn dismissing_confirmation_clears_draft() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let mut state = ready(&fixture, "7");
        let attempt_id = Uuid::new_v4();
        state.submission = Submission::InFlight { attempt_id };

        let drafts = fixture.env.drafts.clone();
        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::PurchaseSucceeded {
                attempt_id,
                payload: json!("ok"),
            })
            .when_action(CheckoutAction::ConfirmationDismissed)
            .then_state(move |state| {
                assert_eq!(state.route, Some(Route::Home));
                assert!(state.draft.is_none());
                assert_eq!(drafts.read(), None);
            })
            .run();
    }

    #[test]
    fn remount_after_purchase_cannot_buy_again() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let mut state = ready(&fixture, "7");
        let attempt_id = Uuid::new_v4();
        state.submission = Submission::InFlight { attempt_id };

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::PurchaseSucceeded {
                attempt_id,
                payload: json!("ok"),
            })
            .when_action(CheckoutAction::ScreenUnmounted)
            .when_action(CheckoutAction::ScreenMounted {
                event_id: EventId::new("7"),
            })
            .when_action(CheckoutAction::TermsAccepted(true))
            .when_action(CheckoutAction::ResalePolicyAccepted(true))
            .when_action(CheckoutAction::Submit)
            .then_state(|state| {
                assert!(state.draft.is_none());
                assert!(!state.timer_running);
                assert!(!state.can_submit());
                assert_eq!(state.validation_error, Some(CheckoutError::MissingDraft));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    fn expire_token(fixture: &Fixture) {
        let token = unsigned_token(&json!({"exp": test_epoch().timestamp() - 10}));
        fixture.storage.set(TOKEN_KEY, &token).unwrap();
    }

    #[test]
    fn expired_session_at_mount_sends_user_to_login() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        expire_token(&fixture);

        let storage = fixture.storage.clone();
        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(CheckoutState::new())
            .when_action(CheckoutAction::ScreenMounted {
                event_id: EventId::new("7"),
            })
            .then_state(move |state| {
                assert_eq!(state.notice, Some(Notice::SessionExpired));
                assert_eq!(state.validation_error, Some(CheckoutError::SessionExpired));
                assert!(!state.timer_running);
                assert_eq!(state.route, None);
                assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_cancels(effects, TIMER);
                assertions::assert_has_delay_effect(effects);
            })
            .run();
    }

    #[test]
    fn session_expiring_before_submit_is_not_treated_as_signed_out() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let state = ready(&fixture, "7");
        expire_token(&fixture);

        let storage = fixture.storage.clone();
        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::Submit)
            .then_state(move |state| {
                assert_eq!(state.validation_error, Some(CheckoutError::SessionExpired));
                assert_eq!(state.notice, Some(Notice::SessionExpired));
                assert_ne!(state.route, Some(Route::SignUp));
                assert_eq!(state.submission, Submission::Idle);
                assert!(!state.timer_running);
                assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
            })
            .then_effects(|effects| {
                assertions::assert_cancels(effects, TIMER);
                assertions::assert_has_delay_effect(effects);
            })
            .run();
    }

    #[test]
    fn submit_is_ignored_while_session_notice_is_up() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        expire_token(&fixture);
        let mut state = mounted(&fixture, "7");
        state.terms_accepted = true;
        state.resale_policy_accepted = true;

        let effects = CheckoutReducer::new().reduce(&mut state, CheckoutAction::Submit, &fixture.env);

        assertions::assert_no_effects(&effects);
        assert_eq!(state.route, None);
        assert_eq!(state.submission, Submission::Idle);
    }

    #[test]
    fn login_redirect_fires_only_while_session_notice_is_up() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        expire_token(&fixture);
        let mut state = mounted(&fixture, "7");

        let reducer = CheckoutReducer::new();
        let _ = reducer.reduce(&mut state, CheckoutAction::LoginRedirectDue, &fixture.env);
        assert_eq!(state.route, Some(Route::Login));

        let mut fresh = CheckoutState::new();
        let _ = reducer.reduce(&mut fresh, CheckoutAction::LoginRedirectDue, &fixture.env);
        assert_eq!(fresh.route, None);
    }

    #[test]
    fn failure_shows_generic_message_and_allows_retry() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let mut state = ready(&fixture, "7");
        let attempt_id = Uuid::new_v4();
        state.submission = Submission::InFlight { attempt_id };

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::PurchaseFailed {
                attempt_id,
                reason: "API error (status 500): boom".into(),
            })
            .then_state(|state| {
                assert_eq!(
                    state.error_message(),
                    Some("Payment or ticket creation failed. Please try again.")
                );
                assert!(state.timer_running);
                assert!(state.can_submit());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn stale_replies_are_ignored() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let mut state = ready(&fixture, "7");
        state.submission = Submission::InFlight {
            attempt_id: Uuid::new_v4(),
        };

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::PurchaseFailed {
                attempt_id: Uuid::new_v4(),
                reason: "late".into(),
            })
            .then_state(|state| assert!(state.is_submitting()))
            .run();
    }

    #[test]
    fn expiry_during_purchase_defers_notice_until_reply() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let mut state = ready(&fixture, "7");
        let attempt_id = Uuid::new_v4();
        state.submission = Submission::InFlight { attempt_id };
        state.window = ReservationWindow::new(0);

        let reducer = CheckoutReducer::new();
        let _ = reducer.reduce(&mut state, CheckoutAction::Tick, &fixture.env);
        assert!(state.window.is_expired());
        assert!(state.notice.is_none());
        assert!(state.expiry_notice_deferred);

        let _ = reducer.reduce(
            &mut state,
            CheckoutAction::PurchaseSucceeded {
                attempt_id,
                payload: json!({"ticketIds": [3]}),
            },
            &fixture.env,
        );
        assert!(state.confirmation().is_some());
        assert_eq!(state.notice, Some(Notice::ReservationExpired));
    }

    #[test]
    fn return_home_closes_notice_and_stops_timer() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let mut state = mounted(&fixture, "7");
        state.notice = Some(Notice::ReservationExpired);

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::ReturnHome)
            .then_state(|state| {
                assert_eq!(state.route, Some(Route::Home));
                assert!(state.notice.is_none());
                assert!(!state.timer_running);
            })
            .then_effects(|effects| assertions::assert_cancels(effects, TIMER))
            .run();
    }

    #[test]
    fn ticks_after_unmount_do_nothing() {
        let fixture = fixture(true);
        with_draft(&fixture, "7", false);
        let state = mounted(&fixture, "7");

        ReducerTest::new(CheckoutReducer::new())
            .with_env(fixture.env.clone())
            .given_state(state)
            .when_action(CheckoutAction::ScreenUnmounted)
            .when_action(CheckoutAction::Tick)
            .then_state(|state| assert_eq!(state.window.remaining_seconds(), 300))
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
