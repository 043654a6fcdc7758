use ::std::sync::Arc;
use ::uuid::Uuid;
use ::warp::Filter;

pub(crate) mod get_health;
pub(crate) mod get_moderation_status;
pub(crate) mod post_finish_submission;
pub(crate) mod post_moderate;
pub(crate) mod post_moderate_batch;
pub(crate) mod post_submit_photo;
pub(crate) mod util;

use self::post_finish_submission::Decision;

pub fn routes(
    state: Arc<crate::State>,
) -> impl Filter<Extract = (impl ::warp::Reply,), Error = ::warp::Rejection> + Clone
{
    let cors = ::warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization", "x-api-key"])
        .allow_methods(&[
            ::warp::http::Method::POST,
            ::warp::http::Method::GET,
        ]);

    let state_filter = ::warp::any().map(move || state.clone());

    let health_route = ::warp::get()
        .and(::warp::path("health"))
        .and(::warp::path::end())
        .and(state_filter.clone())
        .and_then(get_health::handler)
        .with(cors.clone());

    let moderation_status_route = ::warp::get()
        .and(::warp::path!("moderation" / "status"))
        .and(state_filter.clone())
        .and(::warp::header::<String>("authorization"))
        .and_then(get_moderation_status::handler)
        .with(cors.clone());

    let moderate_route = ::warp::post()
        .and(::warp::path!("moderation" / "moderate"))
        .and(state_filter.clone())
        .and(::warp::header::<String>("authorization"))
        .and(::warp::body::bytes())
        .and_then(post_moderate::handler)
        .with(cors.clone());

    let moderate_batch_route = ::warp::post()
        .and(::warp::path!("moderation" / "moderate_batch"))
        .and(state_filter.clone())
        .and(::warp::header::<String>("authorization"))
        .and(::warp::body::bytes())
        .and_then(post_moderate_batch::handler)
        .with(cors.clone());

    let submit_photo_route = ::warp::post()
        .and(::warp::path!("photos" / "submit"))
        .and(state_filter.clone())
        .and(::warp::body::bytes())
        .and_then(post_submit_photo::handler)
        .with(cors.clone());

    let validate_route = ::warp::post()
        .and(::warp::path!("photos" / Uuid / "validate"))
        .and(::warp::any().map(|| Decision::Validate))
        .and(state_filter.clone())
        .and(::warp::header::<String>("x-api-key"))
        .and_then(post_finish_submission::handler)
        .with(cors.clone());

    let reject_route = ::warp::post()
        .and(::warp::path!("photos" / Uuid / "reject"))
        .and(::warp::any().map(|| Decision::Reject))
        .and(state_filter)
        .and(::warp::header::<String>("x-api-key"))
        .and_then(post_finish_submission::handler)
        .with(cors);

    health_route
        .or(moderation_status_route)
        .or(moderate_route)
        .or(moderate_batch_route)
        .or(submit_photo_route)
        .or(validate_route)
        .or(reject_route)
}
