pub mod config;
pub mod handlers;
pub mod moderation;
pub mod postgres;
pub mod storage;
pub mod submissions;

pub struct State {
    pub admin_token: String,
    pub store: postgres::PgStore,
    pub moderation: ::std::sync::Arc<moderation::service::ModerationService>,
    pub gatekeeper: submissions::SubmissionGatekeeper,
}
