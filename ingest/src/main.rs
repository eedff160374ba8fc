use anyhow::Result;
use aws_config::{BehaviorVersion, Region};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use wows_minimap_video::RenderOptions;
use wows_replay_ingest::config::AppConfig;
use wows_replay_ingest::notify::Notifier;
use wows_replay_ingest::persister::Persister;
use wows_replay_ingest::pipeline::IngestPipeline;
use wows_replay_ingest::query::QueryGateway;
use wows_replay_ingest::render_worker::{self, RenderContext};
use wows_replay_ingest::store::dynamodb::{
    BattleTableNames, DynamoBattleStore, DynamoSearchIndexStore,
};
use wows_replay_ingest::store::s3::S3ObjectStore;
use wows_replay_ingest::store::{BattleStore, ObjectStore, SearchIndexStore};
use wows_replay_ingest::web::{self, AppState};
use wows_replay_parser::stats::ship_params::ShipParams;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .try_init();

    let config = AppConfig::load().await?;
    info!(
        bind_addr = %config.bind_addr,
        table_prefix = %config.table_prefix,
        bucket = %config.bucket,
        webhook_set = config.webhook_url.is_some(),
        "config loaded"
    );

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = config.aws_region.clone() {
        loader = loader.region(Region::new(region));
    }
    if let Some(endpoint) = config.aws_endpoint.clone() {
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;

    let dynamo_client = aws_sdk_dynamodb::Client::new(&sdk_config);
    let s3_client = aws_sdk_s3::Client::new(&sdk_config);

    let store: Arc<dyn BattleStore> = Arc::new(DynamoBattleStore::new(
        dynamo_client.clone(),
        BattleTableNames::with_prefix(&config.table_prefix),
    ));
    let index: Arc<dyn SearchIndexStore> = Arc::new(DynamoSearchIndexStore::new(
        dynamo_client,
        config.ship_index_table.clone(),
        config.player_index_table.clone(),
        config.clan_index_table.clone(),
    ));
    let objects: Arc<dyn ObjectStore> =
        Arc::new(S3ObjectStore::new(s3_client, config.bucket.clone()));

    let ships = Arc::new(ShipParams::bundled());
    let persister = Arc::new(Persister::new(store.clone(), index.clone()));
    let query = Arc::new(QueryGateway::new(
        store.clone(),
        index.clone(),
        objects.clone(),
        config.presign_expiry_seconds,
    ));

    let (render_tx, render_rx) = mpsc::channel(config.render_queue_depth);
    let pipeline = Arc::new(IngestPipeline::new(
        ships,
        persister.clone(),
        objects.clone(),
        render_tx.clone(),
    ));

    let notifier = match &config.webhook_url {
        Some(url) => Some(Arc::new(Notifier::new(
            url.clone(),
            config.public_base_url.clone(),
        )?)),
        None => None,
    };

    let render_options = RenderOptions {
        font_path: config.video_font_path.clone().map(Into::into),
        output_duration_secs: config.video_output_seconds,
        ..RenderOptions::default()
    };
    tokio::spawn(render_worker::run(
        render_rx,
        RenderContext {
            store: store.clone(),
            objects: objects.clone(),
            persister,
            options: render_options,
            notifier,
        },
    ));

    let state = AppState {
        config: config.clone(),
        pipeline,
        query,
        objects,
        render_tx,
    };

    let app = web::router(state)
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_seconds,
        )))
        .layer(TraceLayer::new_for_http());

    let addr: std::net::SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("sigterm handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
