use crate::submissions::SubmissionError;
use ::warp::http::StatusCode;

#[macro_export]
macro_rules! warp_try_err_400 {
    ($expr:expr) => {
        match $expr {
            Ok(x) => x,
            Err(err) => {
                return Ok(Box::new(::warp::reply::with_status(
                    err.to_string(),
                    ::warp::http::StatusCode::BAD_REQUEST,
                )));
            }
        }
    };
}

pub(crate) fn is_admin(state: &crate::State, authorization: &str) -> bool {
    ::constant_time_eq::constant_time_eq(
        authorization.as_bytes(),
        state.admin_token.as_bytes(),
    )
}

pub(crate) fn unauthorized() -> Box<dyn ::warp::Reply> {
    Box::new(::warp::reply::with_status("", StatusCode::UNAUTHORIZED))
}

pub(crate) fn json_reply<T: ::serde::Serialize>(
    body: &T,
    status: StatusCode,
) -> Box<dyn ::warp::Reply> {
    Box::new(::warp::reply::with_status(::warp::reply::json(body), status))
}

/// Rejections carry their reasons so the client can explain them.
/// Infrastructure errors stay generic.
pub(crate) fn submission_error_reply(
    err: SubmissionError,
) -> Box<dyn ::warp::Reply> {
    let status = match &err {
        SubmissionError::ContentRejected { reasons, scores } => {
            return json_reply(
                &::serde_json::json!({
                    "error": "Photo rejected by moderation",
                    "reasons": reasons,
                    "scores": scores,
                }),
                StatusCode::UNPROCESSABLE_ENTITY,
            );
        }
        SubmissionError::Internal(inner) => {
            ::log::error!("{:?}", inner);
            return json_reply(
                &::serde_json::json!({ "error": "Internal server error" }),
                StatusCode::INTERNAL_SERVER_ERROR,
            );
        }
        SubmissionError::BarNotFound | SubmissionError::NotFound => {
            StatusCode::NOT_FOUND
        }
        SubmissionError::InvalidApiKey | SubmissionError::WrongBar => {
            StatusCode::UNAUTHORIZED
        }
        SubmissionError::AlreadyProcessed => StatusCode::CONFLICT,
    };

    json_reply(&::serde_json::json!({ "error": err.to_string() }), status)
}
