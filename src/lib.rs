pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod loader;
pub mod orchestration;

pub use config::Config;
pub use datasource::{HttpQuoteProvider, MockQuoteProvider, QuoteError, QuoteProvider};
pub use db::{init_db, Repository};
pub use domain::{
    qty_epsilon, Account, Action, Decimal, Lineage, LineageTable, OptionKind, Symbol, Ticker,
    Transaction, TxId, Validity,
};
pub use engine::{
    assemble, lot_pnl, summarize, Assembly, AssemblyError, Chain, CoinAction, CoinTrade,
    LotMethod, LotPnl, QuoteBook, TransactionGroup, Valuation,
};
pub use error::AppError;
pub use orchestration::{Assembler, IngestReport, Ingestor, QuoteService};
