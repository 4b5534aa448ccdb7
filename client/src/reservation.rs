//! Reservation window.
//!
//! The countdown itself is a plain value; the checkout reducer drives it with
//! one `Tick` per second scheduled through the runtime.

/// Length of the reservation window in seconds
pub const RESERVATION_SECONDS: u32 = 300;

/// Countdown that invalidates a booking draft when it runs out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReservationWindow {
    remaining_seconds: u32,
    expired: bool,
}

/// Result of advancing the window by one second
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still running, with this many seconds left
    Counting(u32),
    /// Ran out on this tick
    Expired,
    /// Had already run out earlier
    AlreadyExpired,
}

impl ReservationWindow {
    /// A window of `seconds`
    #[must_use]
    pub const fn new(seconds: u32) -> Self {
        Self {
            remaining_seconds: seconds,
            expired: false,
        }
    }

    /// The standard five-minute window
    #[must_use]
    pub const fn standard() -> Self {
        Self::new(RESERVATION_SECONDS)
    }

    /// Seconds left, never negative
    #[must_use]
    pub const fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// Whether the window has run out
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        self.expired
    }

    /// Advance by one second
    ///
    /// The window counts down to zero and expires on the tick after that, so
    /// [`TickOutcome::Expired`] is returned exactly once.
    pub fn tick(&mut self) -> TickOutcome {
        if self.expired {
            return TickOutcome::AlreadyExpired;
        }
        match self.remaining_seconds.checked_sub(1) {
            Some(remaining) => {
                self.remaining_seconds = remaining;
                TickOutcome::Counting(remaining)
            },
            None => {
                self.expired = true;
                TickOutcome::Expired
            },
        }
    }

    /// Remaining time as `m:ss`
    #[must_use]
    pub fn display(&self) -> String {
        format!("{}:{:02}", self.remaining_seconds / 60, self.remaining_seconds % 60)
    }
}

impl Default for ReservationWindow {
    fn default() -> Self {
        Self::standard()
    }
}
