use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::Parser;
use rss2ical::cache::{spawn_sweeper, FeedCache};
use rss2ical::fetcher::Fetcher;
use rss2ical::resolver::FeedResolver;
use rss2ical::{configure, AppState, Args};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let address = format!("{}:{}", args.ip, args.port);

    let fetcher = Fetcher::new(Duration::from_secs(args.fetch_timeout)).map_err(|e| {
        error!("Failed to build HTTP client: {}", e);
        std::io::Error::other("HTTP client initialization failed")
    })?;

    let cache = Arc::new(FeedCache::new(
        Duration::from_secs(args.cache_ttl),
        args.cache_capacity,
    ));
    if args.sweep_interval > 0 {
        spawn_sweeper(cache.clone(), Duration::from_secs(args.sweep_interval));
    }

    let app_state = web::Data::new(AppState::new(FeedResolver::new(cache, fetcher)));

    info!("Server running at http://{}", address);
    info!("Calendar endpoint: http://{}/calendar?url=<RSS_URL>", address);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind(&address)?
    .run()
    .await
}
