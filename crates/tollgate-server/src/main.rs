use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{get, web, App, HttpRequest, HttpResponse, HttpServer};

use tollgate_server::middleware::require_payment;
use tollgate_server::{FixedPrice, PaywallConfig, PaywallState, PriceStrategy, RemoteVerifier};

struct AppState {
    paywall: PaywallState<RemoteVerifier>,
    quote_price: FixedPrice,
}

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "tollgate-server",
    }))
}

#[get("/metrics")]
async fn metrics_endpoint() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(tollgate_server::metrics::metrics_output())
}

/// Sample priced endpoint: a fixed-price quote.
#[get("/quote")]
async fn quote(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let strategy: &dyn PriceStrategy = &state.quote_price;
    match require_payment(&req, strategy, &state.paywall).await {
        Ok(outcome) => HttpResponse::Ok().json(serde_json::json!({
            "quote": "the future is already here, it is just not evenly priced",
            "paymentVerified": matches!(outcome, tollgate_server::GateOutcome::Paid(_)),
        })),
        Err(resp) => resp,
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = match PaywallConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let facilitator_url = config
        .facilitator_url
        .clone()
        .unwrap_or_else(|| "http://localhost:4022".to_string());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(4021);

    let state = web::Data::new(AppState {
        paywall: PaywallState::new(config.issuer(), RemoteVerifier::new(&facilitator_url)),
        quote_price: FixedPrice::new("0.10", "one quote, fixed price"),
    });

    // Expired challenges are never looked up again; sweep them so the
    // registry stays bounded under load.
    let sweeper_state = state.clone();
    actix_web::rt::spawn(async move {
        let mut tick = actix_web::rt::time::interval(std::time::Duration::from_secs(60));
        loop {
            tick.tick().await;
            let removed = sweeper_state.paywall.challenges.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, "purged expired challenges");
            }
        }
    });

    tracing::info!("tollgate server listening at http://localhost:{port}");
    tracing::info!("Endpoints: GET /health, GET /metrics, GET /quote (paid)");
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
        .expect("failed to build rate limiter config");

    HttpServer::new(move || {
        App::new()
            .wrap(Governor::new(&governor_conf))
            .app_data(web::JsonConfig::default().limit(65_536))
            .app_data(state.clone())
            .service(health)
            .service(metrics_endpoint)
            .service(quote)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
