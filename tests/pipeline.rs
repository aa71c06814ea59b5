// Feed messages -> stream client -> batch store -> loader -> metrics, with no network.

use std::time::Duration;

use tapex_rs::analytics::orderbook::{latest_orderbook_metrics, orderbook_metrics};
use tapex_rs::analytics::report::MarketReport;
use tapex_rs::analytics::trades::summarize_trades;
use tapex_rs::analytics::SignalConfig;
use tapex_rs::market_data::adapters::binance::{BinanceDepthAdapter, BinanceTradeAdapter};
use tapex_rs::market_data::client::{ClientSettings, StreamClient};
use tapex_rs::market_data::{Level, StreamKind, TradeRecord};
use tapex_rs::persist::{ColumnarStore, DatasetLoader};

const T0: i64 = 1_700_000_000_000;

fn settings() -> ClientSettings {
    ClientSettings { flush_interval: Duration::from_secs(5), ..ClientSettings::default() }
}

fn trade_message(i: i64) -> String {
    let t = T0 + i * 100;
    let maker = i % 2 == 0;
    format!(
        r#"{{"e":"trade","E":{},"s":"BTCUSDT","t":{i},"p":"100.00","q":"1.000","T":{t},"m":{maker},"M":true}}"#,
        t + 3
    )
}

#[tokio::test]
async fn hundred_constant_trades_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ColumnarStore::new(tmp.path());
    let adapter = BinanceTradeAdapter::new("BTCUSDT", "ws://unused");
    let mut client = StreamClient::new(adapter, store, settings());

    // two flush cycles, messages arriving out of order across them
    for i in (50..100).rev() {
        assert!(client.ingest_text(&trade_message(i), T0));
    }
    client.flush_now().await.expect("first batch");
    for i in 0..50 {
        assert!(client.ingest_text(&trade_message(i), T0));
    }
    client.flush_now().await.expect("second batch");
    assert_eq!(client.stats().batches_written, 2);

    let loader = DatasetLoader::new(tmp.path());
    assert_eq!(loader.batch_files(StreamKind::Trades).unwrap().len(), 2);
    let trades = loader.load_trades().unwrap().expect("trades present");
    assert_eq!(trades.len(), 100);
    assert!(trades.windows(2).all(|w| w[0].trade_time <= w[1].trade_time));
    assert_eq!(trades[0].trade_time, T0);

    let m = summarize_trades(&trades).unwrap();
    assert_eq!(m.vwap, Some(100.0));
    assert_eq!(m.buys, 50);
    assert_eq!(m.sells, 50);
    assert_eq!(m.buy_sell_ratio, 1.0);
    assert_eq!(m.volatility_1m, Some(0.0));

    // depth family is still cold
    assert!(loader.load_depth().unwrap().is_none());
}

#[tokio::test]
async fn reference_book_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ColumnarStore::new(tmp.path());
    let adapter = BinanceDepthAdapter::new("btcusdt", "ws://unused", 5, 100);
    let mut client = StreamClient::new(adapter, store, settings());

    assert!(client.ingest_text(r#"{"lastUpdateId":7,"bids":[["100.0","10.0"]],"asks":[["101.0","2.0"]]}"#, T0));
    assert!(!client.ingest_text(r#"{"lastUpdateId":8,"bids":[["x","1"]],"asks":[]}"#, T0 + 100));
    client.flush_now().await.expect("depth batch");

    let depth = DatasetLoader::new(tmp.path()).load_depth().unwrap().expect("depth present");
    assert_eq!(depth.len(), 1);
    assert_eq!(depth[0].event_time, T0);
    assert_eq!(depth[0].bids, vec![Level::new(100.0, 10.0)]);

    let m = orderbook_metrics(&depth[0]).unwrap();
    assert_eq!(m.spread, 1.0);
    assert_eq!(m.mid_price, 100.5);
    assert!((m.imbalance - 8.0 / 12.0).abs() < 1e-12);
    assert!((m.microprice - (101.0 * 10.0 + 100.0 * 2.0) / 12.0).abs() < 1e-9);
    assert_eq!(latest_orderbook_metrics(&depth), Some(m));
}

#[tokio::test]
async fn report_reads_both_families_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ColumnarStore::new(tmp.path());

    let mut trades = StreamClient::new(BinanceTradeAdapter::new("btcusdt", "ws://unused"), store.clone(), settings());
    for i in 0..20 {
        trades.ingest_text(&trade_message(i), T0);
    }
    trades.flush_now().await.unwrap();

    let mut depth = StreamClient::new(BinanceDepthAdapter::new("btcusdt", "ws://unused", 5, 100), store, settings());
    depth.ingest_text(r#"{"bids":[["100.0","10.0"],["99.5","4.0"]],"asks":[["101.0","2.0"]]}"#, T0 + 1_000);
    depth.flush_now().await.unwrap();

    let loader = DatasetLoader::new(tmp.path());
    let t = loader.load_trades().unwrap();
    let d = loader.load_depth().unwrap();
    let report = MarketReport::build(t.as_deref(), d.as_deref(), &SignalConfig::default(), T0 + 2_000);

    assert!(!report.is_cold());
    assert!(report.regime.is_some());
    assert!(report.prediction.is_some());
    assert_eq!(report.heatmap.as_ref().map(Vec::len), Some(3));
    assert_eq!(report.price_series.as_ref().map(Vec::len), Some(20));
}

#[test]
fn cold_store_reports_absent() {
    let tmp = tempfile::tempdir().unwrap();
    let loader = DatasetLoader::new(tmp.path().join("never-written"));
    assert!(loader.load_trades().unwrap().is_none());
    assert!(loader.load_depth().unwrap().is_none());

    let report = MarketReport::build(None, None, &SignalConfig::default(), T0);
    assert!(report.is_cold());
    assert!(report.regime.is_none());
}

#[test]
fn overlapping_batches_merge_sorted() {
    let tmp = tempfile::tempdir().unwrap();
    let store = ColumnarStore::new(tmp.path());
    let trade = |t: i64, price: f64| TradeRecord { event_time: t, trade_time: t, price, qty: 0.5, is_buyer_maker: false };

    // second writer's clock runs behind the first
    store.write_batch(&[trade(10, 1.0), trade(30, 3.0), trade(50, 5.0)]).unwrap();
    store.write_batch(&[trade(20, 2.0), trade(40, 4.0)]).unwrap();

    let merged = DatasetLoader::new(tmp.path()).load_trades().unwrap().unwrap();
    let prices: Vec<f64> = merged.iter().map(|t| t.price).collect();
    assert_eq!(prices, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}
