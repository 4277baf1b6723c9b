//! End-to-end assembly over stored fixtures: store, assemble, persist,
//! re-load.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tempfile::TempDir;

use tradeloom::datasource::MockQuoteProvider;
use tradeloom::db::init_db;
use tradeloom::orchestration::{Assembler, QuoteService};
use tradeloom::{Account, Action, Decimal, Repository, Symbol, Ticker, Transaction};

fn dec(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn day(offset: i64) -> NaiveDateTime {
    (NaiveDate::from_ymd_opt(2022, 1, 3).unwrap() + Duration::days(offset))
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn stock_tx(
    offset: i64,
    ticker: &str,
    action: Action,
    qty: &str,
    price: &str,
    amount: &str,
) -> Transaction {
    Transaction::new(
        Account::new("1234"),
        day(offset),
        Some(Symbol::parse(ticker).unwrap()),
        action,
        dec(qty),
        dec(price),
        Decimal::zero(),
        dec(amount),
        None,
    )
}

async fn setup() -> (Assembler, Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let quotes = Arc::new(QuoteService::new(
        Arc::new(MockQuoteProvider::new()),
        repo.clone(),
    ));
    (Assembler::new(repo.clone(), quotes), repo, temp_dir)
}

#[tokio::test]
async fn test_six_round_trips_six_completed_groups() {
    let (assembler, repo, _temp) = setup().await;
    let account = Account::new("1234");
    let ticker = Ticker::new("VMW");

    // six buys on consecutive days, six sells later; with most-recent-first
    // matching the sells pair with the opens in reverse order, which
    // changes nothing about the multiset of profits
    let mut fixture = Vec::new();
    for offset in 0..6 {
        fixture.push(stock_tx(offset, "VMW", Action::Bto, "10", "100", "-1000"));
    }
    let closes = [
        ("103.84", "1038.40"),
        ("104.84", "1048.40"),
        ("107.57", "1075.70"),
        ("109.08", "1090.80"),
        ("109.17", "1091.70"),
        ("115.87", "1158.70"),
    ];
    for (i, (price, amount)) in closes.iter().enumerate() {
        fixture.push(stock_tx(7 + i as i64, "VMW", Action::Stc, "10", price, amount));
    }
    repo.insert_transactions_batch(&fixture).await.unwrap();

    let today = NaiveDate::from_ymd_opt(2022, 2, 7).unwrap();
    let outcome = assembler
        .group_transactions(&account, &ticker, true, today)
        .await
        .unwrap();

    assert_eq!(outcome.groups.len(), 6);
    assert!(outcome.groups.iter().all(|g| g.completed()));

    let mut profits: Vec<Decimal> = outcome
        .groups
        .iter()
        .map(|g| g.valuation.as_ref().unwrap().profit)
        .collect();
    profits.sort();
    let expected: Vec<Decimal> = ["38.40", "48.40", "75.70", "90.80", "91.70", "158.70"]
        .iter()
        .map(|s| dec(s))
        .collect();
    assert_eq!(profits, expected);

    // full-closure invariant: every chain's opens equal its closes
    for group in &outcome.groups {
        for chain in &group.chains {
            let closed: Decimal = chain.closings.iter().map(|tx| tx.quantity).sum();
            assert_eq!(chain.opening.quantity, closed);
        }
    }

    // the persisted groups agree
    let stored = repo.query_groups(&account, &ticker).await.unwrap();
    assert_eq!(stored.len(), 6);
    let mut stored_profits: Vec<Decimal> = stored
        .iter()
        .map(|g| g.valuation.as_ref().unwrap().profit)
        .collect();
    stored_profits.sort();
    assert_eq!(stored_profits, expected);
}

#[tokio::test]
async fn test_twenty_three_chains_four_left_open() {
    let (assembler, repo, _temp) = setup().await;
    let account = Account::new("1234");
    let ticker = Ticker::new("TWTR");

    // 23 opening days; only 19 positions ever close
    let mut fixture = Vec::new();
    for offset in 0..23 {
        fixture.push(stock_tx(offset, "TWTR", Action::Bto, "10", "100", "-1000"));
    }
    for i in 0..19 {
        fixture.push(stock_tx(30 + i, "TWTR", Action::Stc, "10", "100", "1000"));
    }
    repo.insert_transactions_batch(&fixture).await.unwrap();

    let today = NaiveDate::from_ymd_opt(2022, 3, 1).unwrap();
    let outcome = assembler
        .group_transactions(&account, &ticker, true, today)
        .await
        .unwrap();

    assert_eq!(outcome.groups.len(), 23);
    let incomplete = outcome.groups.iter().filter(|g| !g.completed()).count();
    assert_eq!(incomplete, 4);

    // most-recent-first matching leaves the four oldest opens unclosed
    let mut open_days: Vec<NaiveDateTime> = outcome
        .groups
        .iter()
        .filter(|g| !g.completed())
        .map(|g| g.chains[0].opening.date)
        .collect();
    open_days.sort();
    assert_eq!(open_days, vec![day(0), day(1), day(2), day(3)]);
}

#[tokio::test]
async fn test_same_instant_fragments_merge_before_matching() {
    let (assembler, repo, _temp) = setup().await;
    let account = Account::new("1234");
    let ticker = Ticker::new("AAPL");

    let put = "AAPL 01/28/2022 140.00 P";
    let fragments = vec![
        Transaction::new(
            account.clone(),
            day(0),
            Some(Symbol::parse(put).unwrap()),
            Action::Sto,
            dec("10"),
            dec("0.86"),
            dec("6.60"),
            dec("853.40"),
            None,
        ),
        Transaction::new(
            account.clone(),
            day(0),
            Some(Symbol::parse(put).unwrap()),
            Action::Sto,
            dec("20"),
            dec("0.86"),
            dec("13.20"),
            dec("1706.80"),
            None,
        ),
        Transaction::new(
            account.clone(),
            day(3),
            Some(Symbol::parse(put).unwrap()),
            Action::Btc,
            dec("30"),
            dec("0.20"),
            dec("19.80"),
            dec("-619.80"),
            None,
        ),
    ];
    repo.insert_transactions_batch(&fragments).await.unwrap();

    let today = NaiveDate::from_ymd_opt(2022, 2, 1).unwrap();
    let outcome = assembler
        .group_transactions(&account, &ticker, true, today)
        .await
        .unwrap();

    assert_eq!(outcome.groups.len(), 1);
    let group = &outcome.groups[0];
    assert!(group.completed());
    assert_eq!(group.chains.len(), 1);
    // fragments merged into one opening of 30 contracts
    assert_eq!(group.chains[0].opening.quantity, dec("30"));
    assert_eq!(group.chains[0].opening.amount, dec("2560.20"));
    // the merged synthetic was persisted; both originals retired
    assert_eq!(outcome.created, 1);
    assert_eq!(
        group.valuation.as_ref().unwrap().profit,
        dec("2560.20") - dec("619.80")
    );
}

#[tokio::test]
async fn test_unmatched_close_aborts_batch() {
    let (assembler, repo, _temp) = setup().await;
    let account = Account::new("1234");
    let ticker = Ticker::new("AAPL");

    // a close with no opening activity at all
    repo.insert_transactions_batch(&[stock_tx(
        0,
        "AAPL",
        Action::Stc,
        "10",
        "100",
        "1000",
    )])
    .await
    .unwrap();

    let today = NaiveDate::from_ymd_opt(2022, 2, 1).unwrap();
    let result = assembler
        .group_transactions(&account, &ticker, true, today)
        .await;
    assert!(result.is_err());

    // nothing was persisted for the aborted batch
    let stored = repo.query_groups(&account, &ticker).await.unwrap();
    assert!(stored.is_empty());
}
