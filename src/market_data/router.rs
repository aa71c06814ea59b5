// Wires adapter + client + store for one stream type.
use tokio::sync::watch;
use tracing::info;

use crate::config::AppConfig;
use crate::market_data::adapters::binance::{BinanceDepthAdapter, BinanceTradeAdapter};
use crate::market_data::adapters::VenueAdapter;
use crate::market_data::client::{ClientSettings, ClientStats, StreamClient};
use crate::market_data::types::StreamKind;
use crate::persist::ColumnarStore;

/// Run the ingest pipeline for `kind` until `shutdown` is set.
pub async fn run_stream(kind: StreamKind, cfg: &AppConfig, shutdown: watch::Receiver<bool>) -> ClientStats {
    let store = ColumnarStore::new(&cfg.storage.data_dir);
    let settings = ClientSettings::from_config(cfg);
    let feed = &cfg.feed;
    info!(
        stream = %kind,
        symbol = %feed.symbol,
        data_dir = %cfg.storage.data_dir.display(),
        flush_secs = settings.flush_interval.as_secs(),
        "starting ingest"
    );

    match kind {
        StreamKind::Trades => {
            let adapter = BinanceTradeAdapter::new(&feed.symbol, &feed.ws_base_url);
            drive(adapter, store, settings, shutdown).await
        }
        StreamKind::Depth => {
            let adapter = BinanceDepthAdapter::new(
                &feed.symbol,
                &feed.ws_base_url,
                feed.depth_levels,
                feed.depth_update_ms,
            );
            drive(adapter, store, settings, shutdown).await
        }
    }
}

async fn drive<A: VenueAdapter>(
    adapter: A,
    store: ColumnarStore,
    settings: ClientSettings,
    shutdown: watch::Receiver<bool>,
) -> ClientStats {
    StreamClient::new(adapter, store, settings).run(shutdown).await
}
