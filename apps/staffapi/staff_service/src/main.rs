use actix_web::{App, HttpServer, web};
use common::cache::{KvCache, MemoryCache, RedisCache};
use common::config::{CacheBackend, ServiceConfig};
use common::helix::HelixClient;
use common::room::RoomResolver;
use common::routes::{self, AppState};
use common::staff::StaffLookup;
use common::tmi::TmiClient;
use common::users::UserResolver;
use common::ServiceError;
use std::sync::Arc;
use tracing::{error, info};

async fn build_state(config: &ServiceConfig) -> Result<AppState, ServiceError> {
    let backend = config
        .backend()
        .map_err(|e| ServiceError::Config(e.to_string()))?;

    let cache: Arc<dyn KvCache> = match backend {
        CacheBackend::Redis => Arc::new(RedisCache::connect(&config.redis_url).await?),
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
    };
    info!("Cache backend: {:?}", backend);

    let tmi_client = TmiClient::new(config.tmi_url.clone(), config.http_timeout())?;
    let helix_client = HelixClient::new(
        config.helix_url.clone(),
        config.helix_client_id.clone(),
        config.helix_token.clone(),
        config.http_timeout(),
    )?;

    let staff = StaffLookup::new(
        RoomResolver::new(cache.clone(), Arc::new(tmi_client)),
        UserResolver::new(cache, Arc::new(helix_client)),
    );

    Ok(AppState {
        staff,
        request_timeout: config.request_timeout(),
    })
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = match ServiceConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let state = build_state(&config).await?;
    let timeout = config.http_timeout();

    info!(
        "[API] Listening on {} with a {:?} lookup deadline",
        config.bind_address,
        config.request_timeout()
    );
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .client_request_timeout(timeout)
    .bind(&config.bind_address)?
    .run();

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("HTTP server error: {:?}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
