//! Signup, login, logout and account-activation flows.
//!
//! Every submit handler follows the same order: validate locally, call the
//! backend only if the form is valid, mutate the session only after the
//! backend succeeded, then redirect.

use axum::{
    extract::{rejection::FormRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use common::{
    protocol::{Credentials, NewUser},
    validator::{exact_chars, matches, min_chars, not_blank, EMAIL_RX},
    FormSubmission,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::handlers::{decode_form, redisplay, reject, show_form};
use super::render::{render, FormFields, FormView, Page, TemplateData};
use super::state::AppState;
use crate::api::{ApiError, ApiOutcome};
use crate::error::AppError;
use crate::session::Session;

pub const BLANK: &str = "This field cannot be blank";
pub const INVALID_EMAIL: &str = "This field must be a valid email address";
pub const PASSWORD_TOO_SHORT: &str = "This field must be at least 8 characters long";
pub const EMAIL_IN_USE: &str = "Email address is already in use";
pub const INVALID_CREDENTIALS: &str = "Email or password is incorrect";
pub const TOKEN_LENGTH: &str = "This field must be exactly 26 characters long";
pub const INVALID_ACTIVATION_TOKEN: &str = "Invalid or expired activation token";

pub const SIGNUP_FLASH: &str =
    "Your signup was successful. Check your email for an activation token.";
pub const LOGOUT_FLASH: &str = "You've been logged out successfully!";
pub const ACTIVATED_FLASH: &str = "Your account has been activated. Please log in.";

const MIN_PASSWORD_CHARS: usize = 8;
const ACTIVATION_TOKEN_CHARS: usize = 26;

// ---------------------------------------------------------------------------
// Signup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl FormFields for SignupForm {
    fn redisplay(&self) -> Vec<(&'static str, String)> {
        vec![("name", self.name.clone()), ("email", self.email.clone())]
    }
}

fn validate_signup(values: SignupForm) -> FormSubmission<SignupForm> {
    let mut form = FormSubmission::new(values);
    let v = form.values();
    let checks = [
        (not_blank(&v.name), "name", BLANK),
        (not_blank(&v.email), "email", BLANK),
        (matches(&v.email, &EMAIL_RX), "email", INVALID_EMAIL),
        (not_blank(&v.password), "password", BLANK),
        (min_chars(&v.password, MIN_PASSWORD_CHARS), "password", PASSWORD_TOO_SHORT),
    ];
    for (ok, key, message) in checks {
        form.check_field(ok, key, message);
    }
    form
}

/// `GET /user/signup`
pub async fn signup(session: Session) -> Response {
    show_form(Page::Signup, &session).await
}

/// `POST /user/signup`
pub async fn signup_post(
    State(state): State<AppState>,
    session: Session,
    form: Result<Form<SignupForm>, FormRejection>,
) -> Result<Response, AppError> {
    let mut form = validate_signup(decode_form(form)?);
    if !form.valid() {
        return Ok(redisplay(Page::Signup, StatusCode::UNPROCESSABLE_ENTITY, &session, &form).await);
    }

    let v = form.values();
    let new_user = NewUser {
        name: v.name.clone(),
        email: v.email.clone(),
        password: v.password.clone(),
    };
    match state.backend.create_user(&new_user).await {
        ApiOutcome::Success(user) => {
            info!(user_id = user.id, "user signed up");
            session.put_flash(SIGNUP_FLASH).await;
            Ok(Redirect::to("/").into_response())
        }
        ApiOutcome::ClientRejected(rejection) => {
            if rejection.field("email").is_some() {
                form.add_field_error("email", EMAIL_IN_USE);
            }
            reject(&mut form, &rejection);
            Ok(redisplay(Page::Signup, StatusCode::UNPROCESSABLE_ENTITY, &session, &form).await)
        }
        ApiOutcome::Unauthorized => Err(ApiError::UnexpectedStatus(StatusCode::UNAUTHORIZED).into()),
        ApiOutcome::TransportFailure(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Login / logout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl FormFields for LoginForm {
    fn redisplay(&self) -> Vec<(&'static str, String)> {
        vec![("email", self.email.clone())]
    }
}

fn validate_login(values: LoginForm) -> FormSubmission<LoginForm> {
    let mut form = FormSubmission::new(values);
    let v = form.values();
    let checks = [
        (not_blank(&v.email), "email", BLANK),
        (matches(&v.email, &EMAIL_RX), "email", INVALID_EMAIL),
        (not_blank(&v.password), "password", BLANK),
    ];
    for (ok, key, message) in checks {
        form.check_field(ok, key, message);
    }
    form
}

/// `GET /user/login`
pub async fn login(session: Session) -> Response {
    show_form(Page::Login, &session).await
}

/// `POST /user/login`
///
/// Every way the backend can refuse the credentials reads the same to the
/// user. Only failures to reach the backend at all are server errors.
pub async fn login_post(
    State(state): State<AppState>,
    session: Session,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, AppError> {
    let mut form = validate_login(decode_form(form)?);
    if !form.valid() {
        return Ok(redisplay(Page::Login, StatusCode::UNPROCESSABLE_ENTITY, &session, &form).await);
    }

    let credentials = Credentials {
        email: form.values().email.clone(),
        password: form.values().password.clone(),
    };
    match state.backend.authenticate(&credentials).await {
        ApiOutcome::Success(credential) => {
            session.renew_token().await;
            session.put_credential(credential).await;
            info!("user logged in");
            Ok(Redirect::to("/").into_response())
        }
        // Only an unreachable backend is a server error; any answer it gives
        // that is not a token reads as a refusal.
        ApiOutcome::TransportFailure(e @ (ApiError::Request(_) | ApiError::Timeout(_))) => {
            Err(e.into())
        }
        outcome => {
            warn!(outcome = ?outcome, "login refused by backend");
            form.add_non_field_error(INVALID_CREDENTIALS);
            Ok(redisplay(Page::Login, StatusCode::UNAUTHORIZED, &session, &form).await)
        }
    }
}

/// `POST /user/logout`
pub async fn logout_post(session: Session) -> Response {
    session.renew_token().await;
    session.remove_credential().await;
    session.put_flash(LOGOUT_FLASH).await;
    info!("user logged out");
    Redirect::to("/").into_response()
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivationForm {
    #[serde(default)]
    pub token: String,
}

impl FormFields for ActivationForm {
    fn redisplay(&self) -> Vec<(&'static str, String)> {
        vec![("token", self.token.clone())]
    }
}

fn validate_activation(values: ActivationForm) -> FormSubmission<ActivationForm> {
    let mut form = FormSubmission::new(values);
    let blank = !not_blank(&form.values().token);
    let sized = exact_chars(&form.values().token, ACTIVATION_TOKEN_CHARS);
    form.check_field(!blank, "token", BLANK);
    form.check_field(sized, "token", TOKEN_LENGTH);
    form
}

/// `GET /user/activate`, optionally pre-filled from `?token=`.
pub async fn activate(session: Session, Query(prefill): Query<ActivationForm>) -> Response {
    let data = TemplateData::new(&session)
        .await
        .with_form(FormView::prefilled(&prefill));
    render(Page::Activate, StatusCode::OK, &data)
}

/// `POST /user/activate`
pub async fn activate_post(
    State(state): State<AppState>,
    session: Session,
    form: Result<Form<ActivationForm>, FormRejection>,
) -> Result<Response, AppError> {
    let mut form = validate_activation(decode_form(form)?);
    if !form.valid() {
        return Ok(redisplay(Page::Activate, StatusCode::UNPROCESSABLE_ENTITY, &session, &form).await);
    }

    match state.backend.activate_user(&form.values().token).await {
        ApiOutcome::Success(user) => {
            info!(user_id = user.id, "user activated");
            session.put_flash(ACTIVATED_FLASH).await;
            Ok(Redirect::to("/").into_response())
        }
        ApiOutcome::ClientRejected(rejection) => {
            if rejection.field("token").is_some() {
                form.add_field_error("token", INVALID_ACTIVATION_TOKEN);
            }
            reject(&mut form, &rejection);
            Ok(redisplay(Page::Activate, StatusCode::UNPROCESSABLE_ENTITY, &session, &form).await)
        }
        ApiOutcome::Unauthorized => Err(ApiError::UnexpectedStatus(StatusCode::UNAUTHORIZED).into()),
        ApiOutcome::TransportFailure(e) => Err(e.into()),
    }
}
