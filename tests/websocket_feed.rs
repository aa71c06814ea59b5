// Stream client against a local websocket server that drops the connection on purpose.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use tapex_rs::market_data::adapters::binance::BinanceTradeAdapter;
use tapex_rs::market_data::client::{ClientSettings, StreamClient};
use tapex_rs::market_data::StreamKind;
use tapex_rs::persist::{ColumnarStore, DatasetLoader, WriteFailurePolicy};

fn fast_reconnect() -> ClientSettings {
    ClientSettings {
        flush_interval: Duration::from_secs(60),
        on_write_failure: WriteFailurePolicy::Retain,
        reconnect_min: Duration::from_millis(10),
        reconnect_max: Duration::from_millis(50),
        reconnect_jitter: Duration::ZERO,
    }
}

fn trade(i: i64) -> String {
    let t = 1_700_000_000_000 + i;
    format!(r#"{{"e":"trade","E":{t},"T":{t},"p":"{}","q":"0.01","m":{}}}"#, 100 + i, i % 2 == 0)
}

async fn serve_session(listener: &TcpListener, frames: Vec<String>) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(tcp).await.unwrap();
    for f in frames {
        ws.send(Message::Text(f)).await.unwrap();
    }
    ws.close(None).await.unwrap();
    drain(ws).await;
}

async fn drain(mut ws: WebSocketStream<tokio::net::TcpStream>) {
    while let Some(Ok(_)) = ws.next().await {}
}

#[tokio::test]
async fn reconnects_and_flushes_on_every_disconnect() {
    let tmp = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (third_tx, third_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        serve_session(&listener, vec![trade(0), trade(1), trade(2), r#"{"oops":true}"#.to_string()]).await;
        serve_session(&listener, vec![trade(3), trade(4)]).await;

        let (tcp, _) = listener.accept().await.unwrap();
        let ws = accept_async(tcp).await.unwrap();
        third_tx.send(()).unwrap();
        drain(ws).await;
    });

    let adapter = BinanceTradeAdapter::new("btcusdt", &format!("ws://{addr}"));
    let client = StreamClient::new(adapter, ColumnarStore::new(tmp.path()), fast_reconnect());
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(client.run(stop_rx));

    timeout(Duration::from_secs(10), third_rx).await.unwrap().unwrap();

    // each dropped session was published before the next connect
    let loader = DatasetLoader::new(tmp.path());
    assert_eq!(loader.batch_files(StreamKind::Trades).unwrap().len(), 2);

    stop_tx.send(true).unwrap();
    let stats = timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
    timeout(Duration::from_secs(10), server).await.unwrap().unwrap();

    assert_eq!(stats.messages, 5);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.batches_written, 2);
    assert_eq!(stats.reconnects, 2);

    let trades = loader.load_trades().unwrap().unwrap();
    let prices: Vec<f64> = trades.iter().map(|t| t.price).collect();
    assert_eq!(prices, vec![100.0, 101.0, 102.0, 103.0, 104.0]);
}

#[tokio::test]
async fn keeps_retrying_while_the_feed_is_down() {
    let tmp = tempfile::tempdir().unwrap();
    // grab a free port, then close it so every connect is refused
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();

    let adapter = BinanceTradeAdapter::new("btcusdt", &format!("ws://{addr}"));
    let client = StreamClient::new(adapter, ColumnarStore::new(tmp.path()), fast_reconnect());
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(client.run(stop_rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    stop_tx.send(true).unwrap();
    let stats = timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();

    assert!(stats.reconnects >= 2, "only {} reconnect attempts", stats.reconnects);
    assert_eq!(stats.messages, 0);
    assert!(DatasetLoader::new(tmp.path()).load_trades().unwrap().is_none());
}

#[tokio::test]
async fn timer_flushes_once_per_interval_while_streaming() {
    let tmp = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // one trade every 5 ms until the client goes away
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let mut i = 0;
        while ws.send(Message::Text(trade(i))).await.is_ok() {
            i += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let settings = ClientSettings { flush_interval: Duration::from_millis(200), ..fast_reconnect() };
    let adapter = BinanceTradeAdapter::new("btcusdt", &format!("ws://{addr}"));
    let client = StreamClient::new(adapter, ColumnarStore::new(tmp.path()), settings);
    let (stop_tx, stop_rx) = watch::channel(false);
    let handle = tokio::spawn(client.run(stop_rx));

    // ten flush periods, stopped between ticks
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    stop_tx.send(true).unwrap();
    let stats = timeout(Duration::from_secs(10), handle).await.unwrap().unwrap();
    server.abort();

    // ten timer flushes plus the one on shutdown
    assert!(
        (10..=12).contains(&stats.batches_written),
        "{} batches for ten flush periods",
        stats.batches_written
    );
    assert_eq!(stats.reconnects, 0);
    assert_eq!(stats.rows_written, stats.messages);

    let loader = DatasetLoader::new(tmp.path());
    assert_eq!(loader.batch_files(StreamKind::Trades).unwrap().len() as u64, stats.batches_written);
    assert_eq!(loader.load_trades().unwrap().unwrap().len() as u64, stats.messages);
}
