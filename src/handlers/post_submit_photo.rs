pub(crate) async fn handler(
    state: ::std::sync::Arc<crate::State>,
    bytes: ::bytes::Bytes,
) -> Result<Box<dyn ::warp::Reply>, ::std::convert::Infallible> {
    let submission: crate::submissions::NewSubmission =
        crate::warp_try_err_400!(::serde_json::from_slice(&bytes));

    match state.gatekeeper.submit_photo(submission).await {
        Ok(created) => Ok(crate::handlers::util::json_reply(
            &created,
            ::warp::http::StatusCode::CREATED,
        )),
        Err(err) => Ok(crate::handlers::util::submission_error_reply(err)),
    }
}
