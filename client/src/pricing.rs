//! Price breakdown for a ticket selection.
//!
//! The client computes the amounts it displays; the backend remains the
//! authority on what is actually charged.

use crate::types::Money;

/// Default service fee per ticket (2.00)
pub const DEFAULT_FEE_PER_TICKET: Money = Money::from_cents(200);

/// Default VAT rate in percent
pub const DEFAULT_VAT_PERCENT: u32 = 15;

/// Fee and tax parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pricing {
    /// Flat service fee charged per ticket
    pub fee_per_ticket: Money,
    /// Tax rate applied to the subtotal, in percent
    pub vat_percent: u32,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            fee_per_ticket: DEFAULT_FEE_PER_TICKET,
            vat_percent: DEFAULT_VAT_PERCENT,
        }
    }
}

/// Computed amounts for a selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quote {
    /// Unit price × quantity
    pub price: Money,
    /// Fee × quantity
    pub fees: Money,
    /// VAT on `price`, rounded half-up to the cent
    pub vat: Money,
    /// `price + fees + vat`
    pub total: Money,
}

impl Quote {
    /// All-zero quote used for free events
    pub const FREE: Self = Self {
        price: Money::ZERO,
        fees: Money::ZERO,
        vat: Money::ZERO,
        total: Money::ZERO,
    };
}

impl Pricing {
    /// Quote `quantity` tickets at `unit_price`
    ///
    /// Free events quote zero everywhere regardless of the tier price.
    /// Returns `None` if an amount overflows.
    #[must_use]
    pub fn quote(&self, unit_price: Money, quantity: u32, free: bool) -> Option<Quote> {
        if free {
            return Some(Quote::FREE);
        }

        let price = unit_price.checked_multiply(quantity)?;
        let fees = self.fee_per_ticket.checked_multiply(quantity)?;
        let vat = price.checked_percent(self.vat_percent)?;
        let total = price.checked_add(fees)?.checked_add(vat)?;

        Some(Quote {
            price,
            fees,
            vat,
            total,
        })
    }
}
