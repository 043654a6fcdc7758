const MAX_BATCH_SIZE: usize = 100;

#[derive(::serde::Deserialize)]
struct Request {
    images: Vec<crate::storage::ImageRef>,
}

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

    if request.images.len() > MAX_BATCH_SIZE {
        return Ok(Box::new(::warp::reply::with_status(
            format!("at most {} images per batch", MAX_BATCH_SIZE),
            ::warp::http::StatusCode::PAYLOAD_TOO_LARGE,
        )));
    }

    let results = state.moderation.batch_moderate(&request.images).await;

    Ok(crate::handlers::util::json_reply(
        &results,
        ::warp::http::StatusCode::OK,
    ))
}
