pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod pricing;
pub mod query;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Asset, CostBasisLot, Decimal, Exchange, HoldingPeriod, LotSource, RealizedGainRecord, Side,
    TimeMs, Transaction, TransactionType, UserId,
};
pub use engine::{LedgerEngine, LedgerError, LedgerOutcome, ReplayReport};
pub use error::AppError;
pub use orchestration::{IngestOutcome, Ingestor};
pub use pricing::{MockPriceResolver, PriceError, PriceResolver};
pub use query::{PnlQueries, QueryError};
