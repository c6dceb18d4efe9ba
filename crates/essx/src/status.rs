//! 🚦 Status Classifier — one HTTP code walks in, one convergence state walks out.
//!
//! The whole retry-vs-terminal policy of essx lives in [`classify`]. Nobody else
//! gets to decide whether a 409 is worth retrying. (It isn't. It's a 4xx. The
//! cluster told you no. Respect the no.) 🦆

use crate::common::{ConvergenceState, ObservedStatus};

/// 🔢 Leading decimal digit of a status code. `0` stays `0`.
fn first_digit(code: u16) -> u16 {
    let mut the_digit = code;
    while the_digit >= 10 {
        the_digit /= 10;
    }
    the_digit
}

/// 🚦 Map a status code to its convergence state by first digit.
///
/// `2xx` → `Created`, `4xx` → `Error`, everything else (`1xx`, `3xx`, `5xx`, ...) → `Retry`.
pub fn state_for(code: u16) -> ConvergenceState {
    match first_digit(code) {
        2 => ConvergenceState::Created,
        4 => ConvergenceState::Error,
        _ => ConvergenceState::Retry,
    }
}

/// 📋 Build the full status record for a remote outcome.
pub fn classify(code: u16, message: impl Into<String>) -> ObservedStatus {
    ObservedStatus {
        state: state_for(code),
        code: Some(code),
        message: message.into(),
    }
}

/// ✅ `true` for the `2xx` family.
pub fn is_success(code: u16) -> bool {
    state_for(code) == ConvergenceState::Created
}
