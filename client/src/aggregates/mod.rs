//! Reducers for the booking flow.
//!
//! - Checkout: reservation countdown and purchase submission on the payment screen

pub mod checkout;

pub use checkout::{CheckoutAction, CheckoutEnvironment, CheckoutReducer, CheckoutState};
