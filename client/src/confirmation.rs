//! Purchase confirmation rendered as a QR code.

use crate::error::ConfirmationError;
use qrcode::render::{svg, unicode};
use qrcode::QrCode;
use std::fmt;
use std::sync::Arc;

/// A scannable confirmation of a successful purchase
///
/// The code encodes the backend's response as compact JSON.
#[derive(Clone)]
pub struct TicketConfirmation {
    payload: String,
    code: Arc<QrCode>,
}

impl TicketConfirmation {
    /// Encode a purchase response
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Encode`] if the payload is too large for
    /// a QR code.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, ConfirmationError> {
        let payload = serde_json::to_string(payload)?;
        let code = QrCode::new(payload.as_bytes())
            .map_err(|e| ConfirmationError::Encode(e.to_string()))?;
        Ok(Self {
            payload,
            code: Arc::new(code),
        })
    }

    /// The encoded JSON
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Modules per side
    #[must_use]
    pub fn width(&self) -> usize {
        self.code.width()
    }

    /// SVG document at least 200×200 pixels
    #[must_use]
    pub fn render_svg(&self) -> String {
        self.code
            .render::<svg::Color<'_>>()
            .min_dimensions(200, 200)
            .build()
    }

    /// Half-block rendering for a terminal
    #[must_use]
    pub fn render_terminal(&self) -> String {
        self.code
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build()
    }
}

impl fmt::Debug for TicketConfirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketConfirmation")
            .field("payload", &self.payload)
            .field("width", &self.code.width())
            .finish()
    }
}

impl PartialEq for TicketConfirmation {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Eq for TicketConfirmation {}
