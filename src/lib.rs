use actix_web::{
    get,
    http::{header, Method},
    web, HttpRequest, HttpResponse, Responder,
};
use clap::Parser;
use serde::Deserialize;
use std::time::{Duration, SystemTime};
use tracing::error;

pub mod cache;
pub mod calendar;
pub mod custom_date;
pub mod error;
pub mod feed;
pub mod fetcher;
pub mod resolver;

use cache::CacheEntry;
use error::ResolveError;
use resolver::FeedResolver;

pub const MISSING_URL_MESSAGE: &str = "RSS URL required: use ?url=... parameter";

#[derive(Parser, Debug, Clone)]
#[clap(about, version)]
pub struct Args {
    #[clap(short, long, default_value = "0.0.0.0")]
    pub ip: String,

    #[clap(short, long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Seconds a converted calendar is served from memory.
    #[clap(short = 't', long, default_value = "300")]
    pub cache_ttl: u64,

    /// Maximum number of feeds kept in memory.
    #[clap(short, long, default_value = "1024")]
    pub cache_capacity: usize,

    /// Seconds between sweeps of expired calendars (0 disables sweeping).
    #[clap(short, long, default_value = "60")]
    pub sweep_interval: u64,

    /// Upstream request timeout in seconds.
    #[clap(short, long, default_value = "30")]
    pub fetch_timeout: u64,
}

pub struct AppState {
    pub resolver: FeedResolver,
}

impl AppState {
    pub fn new(resolver: FeedResolver) -> Self {
        Self { resolver }
    }
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    url: Option<String>,
}

/// Registers every route; shared by the server and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(
        web::resource("/calendar")
            .route(web::get().to(calendar))
            .route(web::head().to(calendar))
            .default_service(web::to(|| async {
                HttpResponse::MethodNotAllowed().body("Method not allowed")
            })),
    );
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

async fn calendar(
    query: web::Query<CalendarQuery>,
    app_data: web::Data<AppState>,
    req: HttpRequest,
) -> impl Responder {
    let url = match query.url.as_deref() {
        Some(url) if !url.is_empty() => url,
        _ => return HttpResponse::BadRequest().body(MISSING_URL_MESSAGE),
    };

    let resolver = &app_data.resolver;
    match resolver.resolve(url).await {
        Ok(entry) => create_response(&req, &entry, resolver.cache().ttl()),
        Err(err) => {
            error!(url, error = %err, "failed to convert feed");
            match err {
                ResolveError::Fetch(_) => {
                    HttpResponse::BadGateway().body("Failed to fetch RSS feed")
                }
                ResolveError::Parse(_) => {
                    HttpResponse::BadGateway().body("Failed to parse RSS feed")
                }
                ResolveError::Interrupted(_) => {
                    HttpResponse::InternalServerError().body("Failed to convert to iCalendar")
                }
            }
        }
    }
}

fn create_response(req: &HttpRequest, entry: &CacheEntry, ttl: Duration) -> HttpResponse {
    let last_modified = header::HttpDate::from(SystemTime::from(entry.cached_at));
    let max_age = u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX);

    let mut response = HttpResponse::Ok();
    response.insert_header((header::CONTENT_TYPE, "text/calendar; charset=utf-8"));
    response.insert_header(header::CacheControl(vec![
        header::CacheDirective::Public,
        header::CacheDirective::MaxAge(max_age),
    ]));
    response.insert_header((header::LAST_MODIFIED, last_modified.to_string()));

    if req.method() == Method::HEAD {
        response
            .insert_header((header::CONTENT_LENGTH, entry.body.len()))
            .finish()
    } else {
        response.body(entry.body.clone())
    }
}
