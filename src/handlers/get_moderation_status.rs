pub(crate) async fn handler(
    state: ::std::sync::Arc<crate::State>,
    authorization: String,
) -> Result<Box<dyn ::warp::Reply>, ::std::convert::Infallible> {
    if !crate::handlers::util::is_admin(&state, &authorization) {
        return Ok(crate::handlers::util::unauthorized());
    }

    Ok(crate::handlers::util::json_reply(
        &state.moderation.provider_status(),
        ::warp::http::StatusCode::OK,
    ))
}
