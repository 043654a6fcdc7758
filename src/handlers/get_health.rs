use ::warp::reply::Response;
use ::warp::{http::StatusCode, Reply};

/// Returns 200 when Postgres answers, otherwise 503. The number of enabled
/// moderation providers is reported but does not affect the status, since
/// submissions keep working in degraded mode without any.
pub(crate) async fn handler(
    state: ::std::sync::Arc<crate::State>,
) -> Result<Response, ::std::convert::Infallible> {
    use ::serde_json::json;
    use ::tokio::time::{timeout, Duration};

    let db_ok = timeout(Duration::from_secs(2), state.store.ping())
        .await
        .map(|result| result.is_ok())
        .unwrap_or(false);

    let providers = state.moderation.enabled_provider_count();

    let body = json!({
        "db": db_ok,
        "moderation_providers": providers,
        "status": match (db_ok, providers) {
            (false, _) => "down",
            (true, 0) => "degraded",
            (true, _) => "ok",
        },
    });

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok(
        ::warp::reply::with_status(::warp::reply::json(&body), status)
            .into_response(),
    )
}
