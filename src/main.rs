use anyhow::Context;
use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ip_gatekeeper::config::{Args, GuardConfig};
use ip_gatekeeper::gatekeeper::Gatekeeper;
use ip_gatekeeper::geo::StaticGeoLookup;
use ip_gatekeeper::routes;
use ip_gatekeeper::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli arguments
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GuardConfig::load(path)?,
        None => GuardConfig::default(),
    };

    let mut gatekeeper = Gatekeeper::open(&args.data_dir, config);
    if let Some(path) = &args.geo_table {
        let geo = StaticGeoLookup::load(path)
            .with_context(|| format!("loading geo table {}", path.display()))?;
        gatekeeper = gatekeeper.with_geo(Arc::new(geo));
    }
    let gatekeeper = Arc::new(gatekeeper);

    // creating shared state
    let state = Arc::new(AppState {
        client: reqwest::Client::new(),
        upstream: args.upstream.clone(),
        gatekeeper: Arc::clone(&gatekeeper),
    });

    let app = routes::app(Arc::clone(&state));
    let admin = routes::admin(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    let admin_listener = tokio::net::TcpListener::bind(&args.admin_addr)
        .await
        .with_context(|| format!("binding admin listener {}", args.admin_addr))?;

    let rate = &gatekeeper.config().rate_limit_config;
    info!(port = args.port, upstream = %args.upstream, "gatekeeper running");
    info!(admin = %args.admin_addr, "admin endpoints listening");
    info!(data_dir = %args.data_dir.display(), "durable state directory");
    info!(limit = rate.limit, window_ms = rate.window, "rate limit");
    info!(
        rules = gatekeeper.config().save_endpoints.len(),
        max_size = gatekeeper.config().max_size,
        "request logging"
    );

    let public = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    let admin = axum::serve(admin_listener, admin);

    tokio::try_join!(
        async { public.await.context("public server failed") },
        async { admin.await.context("admin server failed") },
    )?;
    Ok(())
}
