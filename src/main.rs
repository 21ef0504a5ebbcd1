use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ceti_core::api;
use ceti_core::config::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("--------------------------------------------------");
    info!("CETI | CERTIFIED EPISTEMIC TRUST INTERFACE v{}", ceti_core::VERSION);
    info!("Mode: adversarial adjudication - permission, never truth");
    info!("--------------------------------------------------");

    // Hard invariants gate the listener: a misconfigured adjudicator must
    // never accept traffic.
    let config = Config::from_env()?;
    config.enforce_invariants()?;

    let state = web::Data::new(api::build_state(&config)?);
    let bind_addr = config.bind_addr.clone();
    info!(%bind_addr, "adjudication API listening");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(api::routes)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
