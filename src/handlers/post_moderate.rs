#[derive(::serde::Deserialize)]
struct Request {
    image: crate::storage::ImageRef,
}

/// Runs the fallback chain on a single image without creating a
/// submission. Admin only.
pub(crate) async fn handler(
    state: ::std::sync::Arc<crate::State>,
    authorization: String,
    bytes: ::bytes::Bytes,
) -> Result<Box<dyn ::warp::Reply>, ::std::convert::Infallible> {
    if !crate::handlers::util::is_admin(&state, &authorization) {
        return Ok(crate::handlers::util::unauthorized());
    }

    let request: Request =
        crate::warp_try_err_400!(::serde_json::from_slice(&bytes));

    let result = state.moderation.moderate(&request.image).await;

    Ok(crate::handlers::util::json_reply(
        &result,
        ::warp::http::StatusCode::OK,
    ))
}
