//! bank-server: a banking transaction service over a minimal HTTP subset.
//!
//! Clients send one `GET /transaction=<cmd>&account=<id>[&amount=<n>]`
//! request per connection and get a `text/plain` answer:
//! - `create`, `credit`, `debit`, `status` and `reset` operate on an
//!   in-memory ledger shared by all connections
//! - Balances are exact decimals, reported with two fractional digits
//! - Malformed URL escapes are passed through, never rejected
//!
//! The crate also contains the batched load-testing driver used by the
//! `bank-client` binary and by the server's embedded test mode.

pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod logging;
pub mod protocol;
pub mod server;
