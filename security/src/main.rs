use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use jobhub_security::events::{EventStore, MemoryEventStore, PgEventStore, SecurityEventRecorder};
use jobhub_security::handlers::{self, SecurityApiState};
use jobhub_security::metrics::SecurityMetricsAggregator;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    // Service port
    let port = env::var("SECURITY_SERVICE_PORT")
        .unwrap_or_else(|_| "3014".to_string())
        .parse::<u16>()
        .unwrap_or(3014);

    let db_pool: Option<PgPool> = match env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => {
            info!("📊 [Security Service] Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("✅ [Security Service] Database connection established");
            Some(pool)
        }
        _ => {
            warn!("[Security Service] DATABASE_URL not set; security events are kept in memory.");
            None
        }
    };

    let event_store: Arc<dyn EventStore> = match &db_pool {
        Some(pool) => Arc::new(PgEventStore::new(pool.clone())),
        None => Arc::new(MemoryEventStore::new()),
    };

    let state = web::Data::new(SecurityApiState {
        recorder: SecurityEventRecorder::new(event_store.clone()),
        aggregator: SecurityMetricsAggregator::new(event_store),
    });

    info!("🚀 [Security Service] Starting on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .app_data(state.clone())
            .app_data(web::Data::new(db_pool.clone()))
            .wrap(cors)
            .configure(handlers::configure_routes)
            .route("/health", web::get().to(health_check))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}

async fn health_check(
    pool_opt: web::Data<Option<PgPool>>,
) -> actix_web::Result<web::Json<serde_json::Value>> {
    let db_status = match pool_opt.get_ref() {
        Some(pool) => match sqlx::query("SELECT 1 as test").fetch_one(pool).await {
            Ok(_) => "connected",
            Err(e) => {
                log::error!("[Security Service] Database health check failed: {}", e);
                "disconnected"
            }
        },
        None => "disabled",
    };

    Ok(web::Json(serde_json::json!({
        "status": "healthy",
        "service": "security-service",
        "database": db_status,
        "timestamp": chrono::Utc::now()
    })))
}
