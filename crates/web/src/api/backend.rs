//! Typed view of the backend endpoints used by the front end.

use async_trait::async_trait;
use common::protocol::{
    ActivationRequest, AuthenticationToken, AuthenticationTokenEnvelope, Credentials, NewTune,
    NewUser, Tune, TuneEnvelope, User, UserEnvelope,
};
use reqwest::{Method, StatusCode};

use super::client::{ApiClient, ApiOutcome};

/// The backend operations handlers rely on.
///
/// Calls needing a bearer credential take it by value so the caller reads it
/// from the session right before the call and does not keep it around.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /v1/users`
    async fn create_user(&self, user: &NewUser) -> ApiOutcome<User>;

    /// `POST /v1/tokens/authentication`
    async fn authenticate(&self, credentials: &Credentials) -> ApiOutcome<AuthenticationToken>;

    /// `PUT /v1/users/activate`
    async fn activate_user(&self, token: &str) -> ApiOutcome<User>;

    /// `GET /v1/tunes/{id}`
    async fn get_tune(&self, id: i64, bearer: Option<String>) -> ApiOutcome<Tune>;

    /// `POST /v1/tunes`
    async fn create_tune(&self, tune: &NewTune, bearer: Option<String>) -> ApiOutcome<Tune>;
}

#[async_trait]
impl Backend for ApiClient {
    async fn create_user(&self, user: &NewUser) -> ApiOutcome<User> {
        self.call::<_, UserEnvelope>(Method::POST, "/v1/users", Some(user), None)
            .await
            .map(|env| env.user)
    }

    async fn authenticate(&self, credentials: &Credentials) -> ApiOutcome<AuthenticationToken> {
        self.call_expecting::<_, AuthenticationTokenEnvelope>(
            Method::POST,
            "/v1/tokens/authentication",
            Some(credentials),
            None,
            StatusCode::CREATED,
        )
        .await
        .map(|env| env.authentication_token)
    }

    async fn activate_user(&self, token: &str) -> ApiOutcome<User> {
        let body = ActivationRequest {
            token: token.to_owned(),
        };
        self.call::<_, UserEnvelope>(Method::PUT, "/v1/users/activate", Some(&body), None)
            .await
            .map(|env| env.user)
    }

    async fn get_tune(&self, id: i64, bearer: Option<String>) -> ApiOutcome<Tune> {
        self.call_expecting::<(), TuneEnvelope>(
            Method::GET,
            &format!("/v1/tunes/{id}"),
            None,
            bearer.as_deref(),
            StatusCode::OK,
        )
        .await
        .map(|env| env.tune)
    }

    async fn create_tune(&self, tune: &NewTune, bearer: Option<String>) -> ApiOutcome<Tune> {
        self.call::<_, TuneEnvelope>(Method::POST, "/v1/tunes", Some(tune), bearer.as_deref())
            .await
            .map(|env| env.tune)
    }
}
