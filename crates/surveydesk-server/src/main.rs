mod api;
mod middleware;
mod research;
mod selections;

use std::sync::Arc;

use surveydesk_core::{AppConfig, Environment, RateLimitPolicy};
use surveydesk_providers::{EpcClient, GeocoderClient, PoliceClient};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{api_rate_limit_state, build_app, AppState},
    middleware::AuthState,
    research::Providers,
    selections::SelectionRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = surveydesk_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(env = %config.env, bind_addr = %config.bind_addr, "starting surveydesk-server");

    let pool_config = surveydesk_db::PoolConfig::from_app_config(&config);
    let pool = surveydesk_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = surveydesk_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations complete");

    let providers = build_providers(&config)?;
    if !providers.epc.has_credentials() {
        tracing::warn!("EPC_API_USERNAME / EPC_API_KEY not set; certificate checks will fail");
    }

    let auth = AuthState::from_env(
        &config.api_key_hash_salt,
        matches!(config.env, Environment::Development),
    )?;
    let state = AppState {
        pool,
        providers: Arc::new(providers),
        selections: SelectionRegistry::default(),
        provider_policy: RateLimitPolicy::from_secs(
            config.provider_rate_limit,
            config.provider_rate_window_secs,
        ),
    };
    let app = build_app(state, auth, api_rate_limit_state(config.api_rate_limit_per_minute));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn build_providers(config: &AppConfig) -> anyhow::Result<Providers> {
    let timeout = config.provider_timeout_secs;
    let user_agent = config.provider_user_agent.as_str();
    Ok(Providers {
        geocoder: GeocoderClient::with_base_url(timeout, user_agent, &config.geocoder_base_url)?,
        epc: EpcClient::with_base_url(
            config.epc_credentials.clone(),
            timeout,
            user_agent,
            &config.epc_base_url,
        )?,
        police: PoliceClient::with_base_url(timeout, user_agent, &config.police_base_url)?,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
