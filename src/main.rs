use background_service::{
    JobScheduler, RedditPostsJob, TwitterRegionsJob, TwitterTrendsJob, REDDIT_POSTS_JOB,
    TWITTER_REGIONS_JOB, TWITTER_TRENDS_JOB,
};
use database::Database;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use undertow_core::AppConfig;

const DEFAULT_CONFIG_PATH: &str = "undertow.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "undertow=info,undertow_core=info,background_service=info,\
                 reddit_client=info,twitter_client=info,database=info",
            )
        }))
        .init();

    tracing::info!("Starting Undertow - scheduled social-media ingestion");

    let config_path =
        std::env::var("UNDERTOW_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        AppConfig::load(&config_path)?
    } else {
        tracing::info!("No config file at {}, using defaults", config_path);
        AppConfig::default()
    };

    let db = Database::connect(&config.database_url).await?;
    db.run_migrations().await?;
    let db = Arc::new(db);

    let mut scheduler = JobScheduler::new();
    scheduler.register(
        REDDIT_POSTS_JOB,
        config.reddit_interval(),
        config.job_timeout(),
        Arc::new(RedditPostsJob::new(db.clone())),
    );
    scheduler.register(
        TWITTER_REGIONS_JOB,
        config.regions_interval(),
        config.job_timeout(),
        Arc::new(TwitterRegionsJob::new(db.clone())),
    );
    scheduler.register(
        TWITTER_TRENDS_JOB,
        config.trends_interval(),
        config.job_timeout(),
        Arc::new(TwitterTrendsJob::new(db.clone())),
    );

    scheduler.run().await;
    Ok(())
}
