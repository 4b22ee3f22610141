use std::sync::Arc;

use actix_web::{middleware::Compress, web, App, HttpResponse, HttpServer};
use actix_cors::Cors;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use papyrus::captcha::{CaptchaVerifier, DisabledCaptcha, HttpCaptchaVerifier};
use papyrus::clock::SystemClock;
use papyrus::openapi::ApiDoc;
use papyrus::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use papyrus::repo;
use papyrus::scheduler::Scheduler;
use papyrus::{config, AppState, SecurityHeaders};
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "inmem-store")]
use papyrus::repo::inmem::InMemRepo;

async fn metrics_endpoint(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(handle.render())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Environment variables must be set externally (shell, systemd, Docker).
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping papyrus server");

    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    let repo = InMemRepo::new();
    #[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
    info!("Using in-memory repository backend");

    #[cfg(feature = "postgres-store")]
    let repo = {
        use sqlx::postgres::PgPoolOptions;
        let db_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres-store");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&db_url)
            .expect("Failed to create Pg pool");
        info!("Using Postgres repository backend");
        papyrus::repo::pg::PgRepo::new(pool)
    };

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let repo: Arc<dyn repo::Repo> = Arc::new(repo);
    let clock = Arc::new(SystemClock);

    let captcha: Arc<dyn CaptchaVerifier> = match HttpCaptchaVerifier::from_env() {
        Some(v) => {
            info!("CAPTCHA verifier configured");
            Arc::new(v)
        }
        None => {
            info!("No CAPTCHA verifier configured (CAPTCHA_VERIFY_URL / CAPTCHA_SECRET unset)");
            Arc::new(DisabledCaptcha)
        }
    };

    let rate_limiter = RateLimiterFacade::new(
        InMemoryRateLimiter::new(true),
        RateLimitConfig::from_env(),
    );

    let state = AppState {
        repo: repo.clone(),
        clock: clock.clone(),
        captcha,
        rate_limiter,
    };

    // The publication trigger runs beside the HTTP server, coordinating with
    // request handlers only through the store.
    tokio::spawn(Scheduler::new(repo, clock).run());
    info!("Scheduled publication trigger started");

    let openapi = ApiDoc::openapi();
    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allowed_origin("http://localhost:5173")
                .allowed_origin("http://127.0.0.1:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Ok(front) = std::env::var("FRONTEND_URL") {
                c = c.allowed_origin(&front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .configure(config)
            .service(SwaggerUi::new("/docs").url("/docs/openapi.json", openapi.clone()))
            .app_data(web::Data::new(prometheus.clone()))
            .route("/metrics", web::get().to(metrics_endpoint))
            .app_data(web::Data::new(state.clone()))
    })
    .bind(("0.0.0.0", 8080))?;

    info!("Listening on http://0.0.0.0:8080");

    server.run().await
}

/// Validate that required environment variables are set
fn validate_env_vars() {
    use std::env;

    let mut missing = Vec::new();
    for var in ["JWT_SECRET"] {
        if env::var(var).is_err() {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        eprintln!("Missing required environment variables: {missing:?}");
        eprintln!("Please copy .env.example to .env and configure it");
        std::process::exit(1);
    }

    if let Ok(secret) = env::var("JWT_SECRET") {
        if secret.len() < 32 {
            eprintln!("JWT_SECRET must be at least 32 characters long for security");
            std::process::exit(1);
        }
    }
}
