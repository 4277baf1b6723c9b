//! Domain types for the trade-group reconstruction engine.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: TxId, Account, Ticker
//! - Actions with the broker-synonym canonicalization table
//! - Instrument symbols and their three text encodings
//! - The normalized Transaction record and its merge/slice mechanics
//! - The lineage side table tracking merge/slice ancestry

pub mod action;
pub mod decimal;
pub mod lineage;
pub mod primitives;
pub mod symbol;
pub mod transaction;

pub use action::Action;
pub use decimal::Decimal;
pub use lineage::{Lineage, LineageTable};
pub use primitives::{Account, Ticker, TxId};
pub use symbol::{OptionContract, OptionKind, Symbol, SymbolError};
pub use transaction::{qty_epsilon, Transaction, Validity};
