//! Transaction executor.
//!
//! Applies a decoded [`Command`] to the [`Ledger`] and renders the plain-text
//! message returned to the client. Banking failures (unknown account,
//! duplicate account, unrecognized request) are ordinary messages here, not
//! errors.

use crate::command::Command;
use crate::ledger::{Ledger, LedgerResult};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::trace;

pub const INVALID_REQUEST: &str = "Invalid request";
const BALANCE_UPDATED: &str = "Account balance updated";
const NOT_FOUND: &str = "Account not found";
const ALL_RESET: &str = "All accounts reset";

/// Execute a command against the ledger and return the response body.
pub fn execute(command: &Command, ledger: &Ledger) -> String {
    trace!(command = command.name(), "Executing command");

    match command {
        Command::CreateAccount { id } => match ledger.create(id) {
            LedgerResult::Created => format!("Account {id} created"),
            _ => format!("Account {id} already exists"),
        },

        Command::Credit { id, amount } => updated_or_not_found(ledger.credit(id, *amount)),

        Command::Debit { id, amount } => updated_or_not_found(ledger.debit(id, *amount)),

        Command::Status { id } => match ledger.status(id) {
            LedgerResult::Balance(balance) => {
                format!("Account {id}: ${}", format_balance(balance))
            }
            _ => NOT_FOUND.to_string(),
        },

        Command::Reset => {
            ledger.reset();
            ALL_RESET.to_string()
        }

        Command::Unknown => INVALID_REQUEST.to_string(),
    }
}

fn updated_or_not_found(result: LedgerResult) -> String {
    match result {
        LedgerResult::Updated => BALANCE_UPDATED.to_string(),
        LedgerResult::Overflow => INVALID_REQUEST.to_string(),
        _ => NOT_FOUND.to_string(),
    }
}

/// Render a balance with exactly two fractional digits, rounding half away
/// from zero.
pub fn format_balance(balance: Decimal) -> String {
    let mut rounded = balance.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        rounded = Decimal::ZERO;
    }
    format!("{rounded:.2}")
}
