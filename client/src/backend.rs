//! REST backend client.
//!
//! The backend owns ticket allocation and payment; this module only knows how
//! to call it. Screens depend on [`TicketingBackend`] so tests can swap in a
//! scripted implementation.

use crate::error::BackendError;
use crate::types::{EventDetail, EventId, PurchaseRequest, UserProfile};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Backend result
pub type BackendResult<T> = Result<T, BackendError>;

/// Boxed future returned by backend calls
pub type BackendFuture<T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send>>;

/// Operations the booking flow needs from the backend
pub trait TicketingBackend: Send + Sync {
    /// `GET /events/{eventId}`
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on transport failure or a non-2xx response.
    fn fetch_event(&self, event_id: EventId, token: Option<String>) -> BackendFuture<EventDetail>;

    /// `POST /tickets/purchase/{eventId}` with the request as query parameters
    ///
    /// Returns the response body, which becomes the confirmation payload.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on transport failure or a non-2xx response.
    fn purchase(&self, request: PurchaseRequest, token: String) -> BackendFuture<serde_json::Value>;

    /// `GET /user/{email}`
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on transport failure or a non-2xx response.
    fn fetch_user(&self, email: String, token: String) -> BackendFuture<UserProfile>;
}

/// [`TicketingBackend`] over HTTP
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    base: Url,
}

impl HttpBackend {
    /// Create a client for `base_url` with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::RequestFailed`] if `base_url` is not an
    /// absolute URL or the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> BackendResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| BackendError::RequestFailed(format!("invalid base URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::RequestFailed(format!(
                "invalid base URL {base_url}: not a hierarchical URL"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            base,
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment
    fn url(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::RequestFailed(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn send(request: RequestBuilder) -> BackendResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BackendError::Unauthorized),
        StatusCode::NOT_FOUND => Err(BackendError::NotFound),
        status => {
            let body = response.text().await.unwrap_or_default();
            Err(BackendError::ApiError {
                status: status.as_u16(),
                message: body,
            })
        },
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::ResponseParseFailed(e.to_string()))
}

impl TicketingBackend for HttpBackend {
    fn fetch_event(&self, event_id: EventId, token: Option<String>) -> BackendFuture<EventDetail> {
        let request = self.url(&["events", event_id.as_str()]).map(|url| {
            let request = self.client.get(url);
            match token {
                Some(token) => request.bearer_auth(token),
                None => request,
            }
        });

        Box::pin(async move {
            let event: EventDetail = parse(send(request?).await?).await?;
            tracing::debug!(event_id = %event.id, tiers = event.ticket_types.len(), "Event loaded");
            Ok(event)
        })
    }

    fn purchase(&self, request: PurchaseRequest, token: String) -> BackendFuture<serde_json::Value> {
        let http = self
            .url(&["tickets", "purchase", request.event_id.as_str()])
            .map(|url| {
                self.client
                    .post(url)
                    .query(&request.query_pairs())
                    .bearer_auth(token)
            });

        Box::pin(async move {
            tracing::info!(
                event_id = %request.event_id,
                quantity = request.quantity,
                ticket_type = %request.ticket_type_name,
                payment_method = %request.payment_method,
                "Submitting purchase"
            );

            let body = send(http?)
                .await?
                .text()
                .await
                .map_err(|e| BackendError::ResponseParseFailed(e.to_string()))?;

            // Plain-text receipts are kept as a JSON string
            if body.trim().is_empty() {
                return Ok(serde_json::Value::Null);
            }
            Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
        })
    }

    fn fetch_user(&self, email: String, token: String) -> BackendFuture<UserProfile> {
        let request = self
            .url(&["user", email.as_str()])
            .map(|url| self.client.get(url).bearer_auth(token));

        Box::pin(async move { parse(send(request?).await?).await })
    }
}
