use tracing_subscriber::EnvFilter;

/// Compact fmt subscriber; `RUST_LOG` wins over `default_filter`.
/// Safe to call more than once (later calls are ignored).
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .try_init();
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics(listen: std::net::SocketAddr) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .map_err(|e| anyhow::anyhow!("prometheus exporter install: {e}"))?;

    tracing::info!(%listen, "prometheus exporter listening");
    metrics::gauge!("tapex_up").set(1.0);
    Ok(())
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics(_listen: std::net::SocketAddr) -> anyhow::Result<()> {
    Ok(())
}
