use std::sync::Arc;

use anyhow::Context;
use tokio::{net::TcpListener, signal};

use nice_catcher::{
    auth::jwt::JwtService,
    cleanup::CleanupCoordinator,
    config::AppConfig,
    create_router, db, init_tracing,
    memos::{MemoService, MemoSettings},
    state::AppState,
    storage::{LocalStorage, ObjectStorage, S3Storage},
    store::PgStore,
    transcription::{HttpTranscriber, MockTranscriber, Transcriber},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        use_mock = config.use_mock,
        project_name_policy = ?config.project_name_policy,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;
    let store = Arc::new(PgStore::new(pool));

    let local_files = if config.use_mock {
        tracing::warn!(
            data_dir = %config.data_dir.display(),
            "USE_MOCK set; storing objects on local disk with canned transcripts"
        );
        Some(Arc::new(LocalStorage::from_config(&config).await?))
    } else {
        None
    };

    let storage: Arc<dyn ObjectStorage> = match &local_files {
        Some(files) => files.clone(),
        None => Arc::new(S3Storage::from_config(&config).await?),
    };

    let transcriber: Option<Arc<dyn Transcriber>> = if config.use_mock {
        Some(Arc::new(MockTranscriber))
    } else {
        match HttpTranscriber::from_config(&config.transcription) {
            Some(client) => {
                tracing::info!(endpoint = client.endpoint(), "transcription enabled");
                Some(Arc::new(client))
            }
            None => {
                tracing::warn!("AI_BUILDER_TOKEN not set; captured memos will stay pending");
                None
            }
        }
    };

    let (cleanup, cleanup_task) = CleanupCoordinator::spawn(storage.clone());
    let memos = MemoService::new(
        store.clone(),
        storage,
        transcriber,
        cleanup,
        MemoSettings::from_config(&config),
    );
    let jwt = JwtService::from_config(&config)?;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let mut state = AppState::new(config, memos, store, jwt);
    if let Some(files) = local_files {
        state = state.with_local_files(files);
    }
    let app = create_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
        })
        .await?;

    // Router and state are gone, so the queue closes once drained.
    if let Err(err) = cleanup_task.await {
        tracing::warn!(error = %err, "cleanup worker ended abnormally");
    }
    Ok(())
}
