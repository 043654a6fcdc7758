/// Staff decision on a pending submission, authenticated by the bar's API
/// key.
#[derive(Clone, Copy)]
pub(crate) enum Decision {
    Validate,
    Reject,
}

pub(crate) async fn handler(
    id: ::uuid::Uuid,
    decision: Decision,
    state: ::std::sync::Arc<crate::State>,
    api_key: String,
) -> Result<Box<dyn ::warp::Reply>, ::std::convert::Infallible> {
    let outcome = match decision {
        Decision::Validate => {
            state.gatekeeper.validate_submission(id, &api_key).await
        }
        Decision::Reject => state.gatekeeper.reject_submission(id, &api_key).await,
    };

    match outcome {
        Ok(submission) => Ok(crate::handlers::util::json_reply(
            &submission,
            ::warp::http::StatusCode::OK,
        )),
        Err(err) => Ok(crate::handlers::util::submission_error_reply(err)),
    }
}
