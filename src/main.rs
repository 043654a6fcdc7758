use ::envconfig::Envconfig;
use ::log::{info, warn};
use ::std::sync::Arc;

use ::photo_moderation::{
    config::Config,
    handlers,
    moderation::{providers, service::ModerationService},
    postgres::{self, PgStore},
    storage,
    submissions::SubmissionGatekeeper,
    State,
};

async fn connect_postgres(config: &Config) -> ::anyhow::Result<::sqlx::PgPool> {
    let op = || async {
        ::sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .connect(&config.postgres_string)
            .await
            .map_err(|err| {
                warn!("Postgres not ready: {}", err);
                ::backoff::Error::transient(err)
            })
    };

    let pool =
        ::backoff::future::retry(::backoff::ExponentialBackoff::default(), op)
            .await?;

    Ok(pool)
}

fn make_statsd_client(
    config: &Config,
) -> ::anyhow::Result<::cadence::StatsdClient> {
    let socket = ::std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;

    let sink = ::cadence::UdpMetricSink::from(
        (config.statsd_address.as_str(), config.statsd_port),
        socket,
    )?;

    Ok(::cadence::StatsdClient::from_sink(
        "photo_moderation",
        ::cadence::QueuingMetricSink::from(sink),
    ))
}

async fn serve_api(config: &Config) -> ::anyhow::Result<()> {
    info!("Connecting to Postgres");
    let pool = connect_postgres(config).await?;

    let mut transaction = pool.begin().await?;
    postgres::prepare_database(&mut transaction).await?;
    transaction.commit().await?;

    let store = PgStore::new(pool);
    let metrics = Arc::new(make_statsd_client(config)?);
    let images = storage::make_store(config)?;

    let providers = providers::make_providers(config, images.clone()).await;
    let moderation = Arc::new(
        ModerationService::from_config(config, providers)
            .with_metrics(metrics.clone()),
    );

    let gatekeeper = SubmissionGatekeeper::new(
        moderation.clone(),
        images,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    )
    .with_metrics(metrics);

    let state = Arc::new(State {
        admin_token: config.admin_token.clone(),
        store,
        moderation,
        gatekeeper,
    });

    info!("API server listening on {}", config.http_port_api);

    ::warp::serve(handlers::routes(state))
        .run(([0, 0, 0, 0], config.http_port_api))
        .await;

    Ok(())
}

#[tokio::main]
async fn main() -> ::anyhow::Result<()> {
    ::env_logger::init();

    let config = Config::init_from_env()?;

    serve_api(&config).await
}
