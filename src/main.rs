use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use artvault::config::{AppConfig, S3Config};
use artvault::openapi::ApiDoc;
use artvault::repo::Repo;
use artvault::security::SecurityHeaders;
use artvault::session::spawn_purge_task;
use artvault::storage::build_object_store;
use artvault::{config, AppState};

#[cfg(feature = "postgres-store")]
async fn postgres_repo(url: &str) -> anyhow::Result<Arc<dyn Repo>> {
    use sqlx::postgres::PgPoolOptions;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    sqlx::migrate!("./migrations").run(&pool).await.context("failed to run migrations")?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(artvault::repo::pg::PgRepo::new(pool)))
}

#[cfg(not(feature = "postgres-store"))]
async fn postgres_repo(_url: &str) -> anyhow::Result<Arc<dyn Repo>> {
    anyhow::bail!("DATABASE_URL is set but this build has no postgres-store feature")
}

#[cfg(feature = "inmem-store")]
fn fallback_repo() -> anyhow::Result<Arc<dyn Repo>> {
    info!("Using in-memory repository backend");
    Ok(Arc::new(artvault::repo::inmem::InMemRepo::new()))
}

#[cfg(not(feature = "inmem-store"))]
fn fallback_repo() -> anyhow::Result<Arc<dyn Repo>> {
    anyhow::bail!("DATABASE_URL must be set when built without inmem-store")
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; deployments set the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env().context("invalid configuration (see .env.example)")?;
    info!("Bootstrapping Art Vault server");
    info!("Frontend URL: {}", cfg.frontend_url);

    let repo = match &cfg.database_url {
        Some(url) => postgres_repo(url).await?,
        None => fallback_repo()?,
    };
    let object_store = build_object_store(&S3Config::from_env()).await?;
    let state = AppState::new(repo.clone(), object_store);
    spawn_purge_task(repo, cfg.refresh_purge_every);

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let frontend_url = cfg.frontend_url.clone();
    let hardening = SecurityHeaders::new(cfg.enable_hsts);
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            // local React/Vite dev server
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:5173")
            .allowed_origin(&frontend_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(hardening)
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);

    server.run().await?;
    Ok(())
}
