//! Banking command decoder.
//!
//! Requests carry their command in the target of a `GET` line:
//!
//! ```text
//! transaction=create&account=42
//! transaction=credit&account=42&amount=10.5
//! transaction=debit&account=42&amount=3
//! transaction=status&account=42
//! transaction=reset
//! ```
//!
//! The target is URL-decoded first, then split into `key=value` pairs. Only
//! `transaction`, `account` and `amount` are recognized; anything that does
//! not add up to a complete command decodes to [`Command::Unknown`].

use rust_decimal::Decimal;
use std::str::FromStr;

/// Decoded banking command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a new account
    CreateAccount { id: String },
    /// Add funds to an account
    Credit { id: String, amount: Decimal },
    /// Withdraw funds from an account
    Debit { id: String, amount: Decimal },
    /// Report an account balance
    Status { id: String },
    /// Remove every account
    Reset,
    /// Anything that is not a complete, recognized command
    Unknown,
}

impl Command {
    /// Decode a request target such as `transaction=status&account=7`.
    pub fn parse(target: &str) -> Command {
        let decoded = url_decode(target);
        let query = decoded.strip_prefix('?').unwrap_or(&decoded);

        let mut transaction = None;
        let mut account = None;
        let mut amount = None;

        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "transaction" => transaction = Some(value),
                "account" => account = Some(value).filter(|id| !id.is_empty()),
                "amount" => amount = Some(value),
                _ => {}
            }
        }

        let Some(transaction) = transaction else {
            return Command::Unknown;
        };
        let id = account.map(str::to_string);
        let amount = amount.and_then(|a| Decimal::from_str(a.trim()).ok());

        match (transaction.to_ascii_lowercase().as_str(), id, amount) {
            ("create", Some(id), _) => Command::CreateAccount { id },
            ("credit", Some(id), Some(amount)) => Command::Credit { id, amount },
            ("debit", Some(id), Some(amount)) => Command::Debit { id, amount },
            ("status", Some(id), _) => Command::Status { id },
            ("reset", _, _) => Command::Reset,
            _ => Command::Unknown,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateAccount { .. } => "create",
            Command::Credit { .. } => "credit",
            Command::Debit { .. } => "debit",
            Command::Status { .. } => "status",
            Command::Reset => "reset",
            Command::Unknown => "unknown",
        }
    }
}

/// Decode `%XX` escapes and `+` in a URL-encoded string.
///
/// Malformed escapes (a trailing `%`, or `%` not followed by two hex digits)
/// are copied through unchanged, so this never fails. Input without escapes
/// comes back as-is.
pub fn url_decode(input: &str) -> String {
    if !input.contains(['%', '+']) {
        return input.to_string();
    }

    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => match (bytes.get(i + 1), bytes.get(i + 2)) {
                (Some(&hi), Some(&lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                    out.push((hex_value(hi) << 4) | hex_value(lo));
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}
