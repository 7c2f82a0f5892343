use lotledger::config::WeekStart;
use lotledger::db::init_db;
use lotledger::domain::{
    Asset, Decimal, Exchange, Side, TimeMs, Transaction, TransactionType, UserId,
};
use lotledger::engine::LedgerEngine;
use lotledger::orchestration::Ingestor;
use lotledger::pricing::{MockPriceResolver, PriceResolver};
use lotledger::query::PnlQueries;
use lotledger::Repository;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Harness {
    ingestor: Ingestor,
    queries: PnlQueries,
    repo: Arc<Repository>,
    _temp: TempDir,
}

async fn setup() -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let prices: Arc<dyn PriceResolver> = Arc::new(
        MockPriceResolver::new()
            .with_current("BTC", d("50000"))
            .with_current("ETH", d("3000")),
    );
    let engine = LedgerEngine::new(repo.clone(), prices.clone());
    Harness {
        ingestor: Ingestor::new(repo.clone(), engine),
        queries: PnlQueries::new(repo.clone(), prices, WeekStart::Sunday),
        repo,
        _temp: temp_dir,
    }
}

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn user() -> UserId {
    UserId::new("replayer")
}

fn trade(ext: &str, asset: &str, side: Side, amount: &str, price: &str, time_ms: i64) -> Transaction {
    Transaction::new(
        user(),
        Exchange::new("coinbase"),
        ext,
        Asset::new(asset),
        d(amount),
        TransactionType::Trade,
        Some(side),
        Some(d(price)),
        TimeMs::new(time_ms),
    )
}

fn history() -> Vec<Transaction> {
    vec![
        trade("1", "BTC", Side::Buy, "1", "20000", 1_000),
        trade("2", "BTC", Side::Buy, "1", "30000", 2_000),
        trade("3", "ETH", Side::Buy, "10", "1000", 2_500),
        trade("4", "BTC", Side::Sell, "1.5", "40000", 3_000),
        trade("5", "ETH", Side::Sell, "4", "2500", 4_000),
        trade("6", "BTC", Side::Buy, "0.25", "45000", 5_000),
        Transaction::new(
            user(),
            Exchange::new("coinbase"),
            "7",
            Asset::new("BTC"),
            d("0.1"),
            TransactionType::Transfer,
            None,
            None,
            TimeMs::new(5_500),
        ),
    ]
}

#[tokio::test]
async fn test_recalculate_twice_yields_identical_totals() {
    let h = setup().await;
    for t in history() {
        h.ingestor.ingest(&t).await.unwrap();
    }
    let before = h.queries.summary(&user()).await.unwrap();

    let cancel = CancellationToken::new();
    let first = h.ingestor.recalculate(&user(), &cancel).await.unwrap();
    assert_eq!(first.total, 7);
    assert_eq!(first.processed, 7);
    assert_eq!(first.failed, 0);
    assert!(!first.cancelled);
    let after_first = h.queries.summary(&user()).await.unwrap();

    h.ingestor.recalculate(&user(), &cancel).await.unwrap();
    let after_second = h.queries.summary(&user()).await.unwrap();

    for s in [&after_first, &after_second] {
        assert_eq!(s.total_realized_pnl, before.total_realized_pnl);
        assert_eq!(s.total_unrealized_pnl, before.total_unrealized_pnl);
        assert_eq!(s.by_asset, before.by_asset);
    }

    // BTC: 1 @ 20000 + 0.5 @ 30000 = 35000 cost, 60000 proceeds
    // ETH: 4 @ 1000 = 4000 cost, 10000 proceeds
    assert_eq!(before.total_realized_pnl, d("31000"));

    let lots = h.repo.query_open_lots(&user()).await.unwrap();
    let quantities: Vec<(String, Decimal)> = lots
        .iter()
        .map(|l| (l.asset.to_string(), l.remaining_amount))
        .collect();
    assert_eq!(
        quantities,
        vec![
            ("BTC".to_string(), d("0.5")),
            ("BTC".to_string(), d("0.25")),
            ("ETH".to_string(), d("6")),
        ]
    );
}

#[tokio::test]
async fn test_replay_orders_by_timestamp_not_arrival() {
    let h = setup().await;
    // Sell arrives before the buy it should match against.
    let buy = trade("b", "BTC", Side::Buy, "1", "10000", 1_000);
    let sell = trade("s", "BTC", Side::Sell, "1", "15000", 2_000);
    h.ingestor.ingest(&sell).await.unwrap();
    h.ingestor.ingest(&buy).await.unwrap();

    let incremental = h.queries.summary(&user()).await.unwrap();
    assert_eq!(incremental.total_realized_pnl, Decimal::zero());

    let report = h
        .ingestor
        .recalculate(&user(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.processed, 2);

    let replayed = h.queries.summary(&user()).await.unwrap();
    assert_eq!(replayed.total_realized_pnl, d("5000"));
    assert!(h.repo.query_open_lots(&user()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replay_skips_failures_and_counts_them() {
    let h = setup().await;
    let zero = trade("z", "BTC", Side::Buy, "0", "100", 500);
    h.repo.insert_transaction(&zero).await.unwrap();
    for t in history() {
        h.ingestor.ingest(&t).await.unwrap();
    }

    let report = h
        .ingestor
        .recalculate(&user(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.total, 8);
    assert_eq!(report.processed, 7);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_replay_skips_oversized_stored_transaction() {
    let h = setup().await;
    for t in history() {
        h.ingestor.ingest(&t).await.unwrap();
    }
    let huge = trade("huge", "BTC", Side::Sell, "10000000000000000000000000000", "100000", 6_000);
    h.repo.insert_transaction(&huge).await.unwrap();
    let before = h.queries.summary(&user()).await.unwrap();

    let report = h
        .ingestor
        .recalculate(&user(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.total, 8);
    assert_eq!(report.processed, 7);
    assert_eq!(report.failed, 1);
    assert!(!report.cancelled);

    let after = h.queries.summary(&user()).await.unwrap();
    assert_eq!(after.total_realized_pnl, before.total_realized_pnl);
}

#[tokio::test]
async fn test_cancelled_replay_stops_early() {
    let h = setup().await;
    for t in history() {
        h.ingestor.ingest(&t).await.unwrap();
    }

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = h.ingestor.recalculate(&user(), &cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.processed, 0);
    assert!(h.repo.query_all_lots(&user()).await.unwrap().is_empty());

    // a later replay restores the ledger
    let report = h
        .ingestor
        .recalculate(&user(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.processed, 7);
    assert_eq!(h.repo.query_open_lots(&user()).await.unwrap().len(), 3);
}
