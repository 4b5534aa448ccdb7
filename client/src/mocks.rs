//! Scripted backend for tests and offline demos.

use crate::backend::{BackendFuture, BackendResult, TicketingBackend};
use crate::error::BackendError;
use crate::types::{EventDetail, EventId, PurchaseRequest, UserProfile};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A call received by [`MockBackend`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    /// `fetch_event`
    FetchEvent {
        /// Requested event
        event_id: EventId,
        /// Whether a bearer token was sent
        authenticated: bool,
    },
    /// `purchase`
    Purchase {
        /// The request as sent
        request: PurchaseRequest,
        /// Bearer token
        token: String,
    },
    /// `fetch_user`
    FetchUser {
        /// Requested email
        email: String,
    },
}

#[derive(Debug)]
struct Script {
    events: HashMap<EventId, EventDetail>,
    users: HashMap<String, UserProfile>,
    purchase: BackendResult<serde_json::Value>,
    calls: Vec<BackendCall>,
}

/// In-memory [`TicketingBackend`] with scripted replies
///
/// Unknown events and users answer [`BackendError::NotFound`]. Purchases
/// answer `{"status": "ok"}` unless scripted otherwise. Clones share the
/// same script and call log.
#[derive(Clone, Debug)]
pub struct MockBackend {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Creates an empty mock backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                events: HashMap::new(),
                users: HashMap::new(),
                purchase: Ok(serde_json::json!({"status": "ok"})),
                calls: Vec::new(),
            })),
            delay: None,
        }
    }

    /// Serve `event` from `fetch_event`
    #[must_use]
    pub fn with_event(self, event: EventDetail) -> Self {
        self.lock().events.insert(event.id.clone(), event);
        self
    }

    /// Serve `profile` from `fetch_user`
    #[must_use]
    pub fn with_user(self, profile: UserProfile) -> Self {
        self.lock().users.insert(profile.email.clone(), profile);
        self
    }

    /// Answer purchases with `payload`
    #[must_use]
    pub fn with_purchase_response(self, payload: serde_json::Value) -> Self {
        self.lock().purchase = Ok(payload);
        self
    }

    /// Fail purchases with `error`
    #[must_use]
    pub fn with_purchase_error(self, error: BackendError) -> Self {
        self.lock().purchase = Err(error);
        self
    }

    /// Delay every reply by `delay`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls received so far
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Number of purchase calls received
    #[must_use]
    pub fn purchase_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, BackendCall::Purchase { .. }))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn reply<T: Send + 'static>(&self, result: BackendResult<T>) -> BackendFuture<T> {
        let delay = self.delay;
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

impl TicketingBackend for MockBackend {
    fn fetch_event(&self, event_id: EventId, token: Option<String>) -> BackendFuture<EventDetail> {
        let result = {
            let mut script = self.lock();
            script.calls.push(BackendCall::FetchEvent {
                event_id: event_id.clone(),
                authenticated: token.is_some(),
            });
            script.events.get(&event_id).cloned().ok_or(BackendError::NotFound)
        };
        self.reply(result)
    }

    fn purchase(&self, request: PurchaseRequest, token: String) -> BackendFuture<serde_json::Value> {
        let result = {
            let mut script = self.lock();
            script.calls.push(BackendCall::Purchase { request, token });
            script.purchase.clone()
        };
        self.reply(result)
    }

    fn fetch_user(&self, email: String, _token: String) -> BackendFuture<UserProfile> {
        let result = {
            let mut script = self.lock();
            script.calls.push(BackendCall::FetchUser {
                email: email.clone(),
            });
            script.users.get(&email).cloned().ok_or(BackendError::NotFound)
        };
        self.reply(result)
    }
}
