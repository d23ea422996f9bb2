//! Tune pages. Every route here sits behind the authentication gate.

use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use common::{
    protocol::NewTune,
    validator::{max_chars, not_blank},
    FormSubmission,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::handlers::{decode_form, redisplay, reject, show_form};
use super::middleware::LOGIN_PATH;
use super::render::{render, FormFields, Page, TemplateData};
use super::state::AppState;
use super::users::BLANK;
use crate::api::{ApiError, ApiOutcome};
use crate::error::AppError;
use crate::session::Session;

pub const TITLE_TOO_LONG: &str = "This field cannot be more than 100 characters long";
pub const EMPTY_LIST: &str = "Provide at least one value, separated by commas";
pub const CREATED_FLASH: &str = "Tune successfully created!";
pub const EXPIRED_FLASH: &str = "Your session has expired. Please log in again.";

const MAX_TITLE_CHARS: usize = 100;

/// `GET /tune/view/:id`
///
/// Ids that are not positive integers are answered with 404 without asking
/// the backend.
pub async fn view(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = match id.parse::<i64>() {
        Ok(id) if id >= 1 => id,
        _ => return Err(AppError::NotFound),
    };

    match state.backend.get_tune(id, session.bearer().await).await {
        ApiOutcome::Success(tune) => {
            let data = TemplateData::new(&session).await.with_tune(tune);
            Ok(render(Page::TuneView, StatusCode::OK, &data))
        }
        ApiOutcome::ClientRejected(_)
        | ApiOutcome::Unauthorized
        | ApiOutcome::TransportFailure(ApiError::UnexpectedStatus(_)) => Err(AppError::NotFound),
        ApiOutcome::TransportFailure(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TuneForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub styles: String,
    #[serde(default)]
    pub keys: String,
    #[serde(default)]
    pub time_signature: String,
    #[serde(default)]
    pub structure: String,
    /// Checkbox: present (any value) when ticked, absent otherwise.
    pub has_lyrics: Option<String>,
}

impl FormFields for TuneForm {
    fn redisplay(&self) -> Vec<(&'static str, String)> {
        vec![
            ("title", self.title.clone()),
            ("styles", self.styles.clone()),
            ("keys", self.keys.clone()),
            ("time_signature", self.time_signature.clone()),
            ("structure", self.structure.clone()),
            ("has_lyrics", self.has_lyrics.clone().unwrap_or_default()),
        ]
    }
}

/// Split a comma separated list, dropping blank entries.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn validate_tune(values: TuneForm) -> (FormSubmission<TuneForm>, NewTune) {
    let tune = NewTune {
        title: values.title.trim().to_owned(),
        styles: split_list(&values.styles),
        keys: split_list(&values.keys),
        time_signature: values.time_signature.trim().to_owned(),
        structure: values.structure.trim().to_owned(),
        has_lyrics: values.has_lyrics.is_some(),
    };

    let mut form = FormSubmission::new(values);
    let checks = [
        (not_blank(&tune.title), "title", BLANK),
        (max_chars(&tune.title, MAX_TITLE_CHARS), "title", TITLE_TOO_LONG),
        (!tune.styles.is_empty(), "styles", EMPTY_LIST),
        (!tune.keys.is_empty(), "keys", EMPTY_LIST),
        (not_blank(&tune.time_signature), "time_signature", BLANK),
        (not_blank(&tune.structure), "structure", BLANK),
    ];
    for (ok, key, message) in checks {
        form.check_field(ok, key, message);
    }
    (form, tune)
}

/// `GET /tune/create`
pub async fn create(session: Session) -> Response {
    show_form(Page::TuneCreate, &session).await
}

/// `POST /tune/create`
pub async fn create_post(
    State(state): State<AppState>,
    session: Session,
    form: Result<Form<TuneForm>, FormRejection>,
) -> Result<Response, AppError> {
    let (mut form, tune) = validate_tune(decode_form(form)?);
    if !form.valid() {
        return Ok(redisplay(Page::TuneCreate, StatusCode::UNPROCESSABLE_ENTITY, &session, &form).await);
    }

    match state.backend.create_tune(&tune, session.bearer().await).await {
        ApiOutcome::Success(created) => {
            info!(tune_id = created.id, "tune created");
            session.put_flash(CREATED_FLASH).await;
            Ok(Redirect::to(&format!("/tune/view/{}", created.id)).into_response())
        }
        ApiOutcome::ClientRejected(rejection) => {
            reject(&mut form, &rejection);
            Ok(redisplay(Page::TuneCreate, StatusCode::UNPROCESSABLE_ENTITY, &session, &form).await)
        }
        ApiOutcome::Unauthorized => {
            warn!("backend refused stored credential");
            session.remove_credential().await;
            session.put_flash(EXPIRED_FLASH).await;
            Ok(Redirect::to(LOGIN_PATH).into_response())
        }
        ApiOutcome::TransportFailure(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::http::header::{CACHE_CONTROL, LOCATION};
    use common::{protocol::Tune, ApiRejection};

    use std::sync::Arc;
    use std::time::Duration;

    use axum::{routing::get, Router};

    use super::*;
    use crate::api::{backend::MockBackend, client::tests::spawn_stub, ApiClient};
    use crate::server::testing::{body_text, seed_session, TestApp, BEARER};

    fn tune(id: i64) -> Tune {
        Tune {
            id,
            title: "The Kesh".into(),
            styles: vec!["Jig".into()],
            keys: vec!["G major".into()],
            time_signature: "6/8".into(),
            structure: "AABB".into(),
            has_lyrics: false,
        }
    }

    const VALID_TUNE: &str =
        "title=The+Kesh&styles=Jig%2C+Irish&keys=G+major&time_signature=6%2F8&structure=AABB&has_lyrics=on";

    #[test]
    fn lists_are_split_and_trimmed() {
        assert_eq!(split_list(" reel, jig ,,  "), vec!["reel", "jig"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn tune_validation() {
        let (form, _) = validate_tune(TuneForm {
            title: "x".repeat(101),
            styles: " , ".into(),
            ..TuneForm::default()
        });
        let v = form.validator();
        assert_eq!(v.field_error("title"), Some(TITLE_TOO_LONG));
        assert_eq!(v.field_error("styles"), Some(EMPTY_LIST));
        assert_eq!(v.field_error("keys"), Some(EMPTY_LIST));
        assert_eq!(v.field_error("time_signature"), Some(BLANK));
        assert_eq!(v.field_error("structure"), Some(BLANK));

        let (ok, tune) = validate_tune(TuneForm {
            title: "Drowsy Maggie".into(),
            styles: "Reel".into(),
            keys: "E dorian, D major".into(),
            time_signature: "4/4".into(),
            structure: "AABB".into(),
            has_lyrics: None,
        });
        assert!(ok.valid());
        assert_eq!(tune.keys, vec!["E dorian", "D major"]);
        assert!(!tune.has_lyrics);
    }

    #[tokio::test]
    async fn view_renders_the_tune_with_the_session_bearer() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_tune()
            .withf(|id, bearer| *id == 7 && bearer.as_deref() == Some(BEARER))
            .times(1)
            .returning(|id, _| ApiOutcome::Success(tune(id)));
        let app = TestApp::new(backend);
        let seeded = seed_session(&app.sessions, true).await;

        let resp = app.get("/tune/view/7", Some(&seeded)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CACHE_CONTROL], "no-store");
        let body = body_text(resp).await;
        assert!(body.contains("The Kesh"));
        assert!(body.contains("6/8"));
    }

    #[tokio::test]
    async fn bad_ids_are_404_without_a_backend_call() {
        let mut backend = MockBackend::new();
        backend.expect_get_tune().never();
        let app = TestApp::new(backend);
        let seeded = seed_session(&app.sessions, true).await;

        for uri in ["/tune/view/0", "/tune/view/-3", "/tune/view/abc"] {
            let resp = app.get(uri, Some(&seeded)).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn missing_tune_is_404_and_transport_failure_is_500() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_tune()
            .withf(|id, _| *id == 404)
            .returning(|_, _| ApiOutcome::ClientRejected(ApiRejection::default()));
        backend
            .expect_get_tune()
            .withf(|id, _| *id == 500)
            .returning(|_, _| ApiOutcome::TransportFailure(ApiError::Decode("bad".into())));
        let app = TestApp::new(backend);
        let seeded = seed_session(&app.sessions, true).await;

        let missing = app.get("/tune/view/404", Some(&seeded)).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let broken = app.get("/tune/view/500", Some(&seeded)).await;
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unavailable_backend_on_view_is_404() {
        let stub = Router::new().route(
            "/v1/tunes/5",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let base = spawn_stub(stub).await;
        let client = ApiClient::new(&base, Duration::from_secs(5)).unwrap();
        let app = TestApp::with_backend(Arc::new(client));
        let seeded = seed_session(&app.sessions, true).await;

        let resp = app.get("/tune/view/5", Some(&seeded)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(resp).await, "Not Found");
    }

    #[tokio::test]
    async fn anonymous_view_never_reaches_the_backend() {
        let mut backend = MockBackend::new();
        backend.expect_get_tune().never();
        let app = TestApp::new(backend);

        let resp = app.get("/tune/view/1", None).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[LOCATION], LOGIN_PATH);
    }

    #[tokio::test]
    async fn created_tune_redirects_to_its_page() {
        let mut backend = MockBackend::new();
        backend
            .expect_create_tune()
            .withf(|t, bearer| {
                t.styles == ["Jig", "Irish"] && t.has_lyrics && bearer.as_deref() == Some(BEARER)
            })
            .times(1)
            .returning(|_, _| ApiOutcome::Success(tune(42)));
        let app = TestApp::new(backend);
        let seeded = seed_session(&app.sessions, true).await;

        let resp = app.post_form("/tune/create", &seeded, VALID_TUNE).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[LOCATION], "/tune/view/42");
        let session = app.session(&seeded.token).await;
        assert_eq!(session.pop_flash().await.as_deref(), Some(CREATED_FLASH));
    }

    #[tokio::test]
    async fn rejected_tune_is_redisplayed() {
        let mut backend = MockBackend::new();
        backend.expect_create_tune().times(1).returning(|_, _| {
            ApiOutcome::ClientRejected(ApiRejection {
                fields: BTreeMap::from([("title".to_owned(), "must be unique".to_owned())]),
                general: Vec::new(),
            })
        });
        let app = TestApp::new(backend);
        let seeded = seed_session(&app.sessions, true).await;

        let resp = app.post_form("/tune/create", &seeded, VALID_TUNE).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_text(resp).await;
        assert!(body.contains("must be unique"));
        assert!(body.contains("value='The Kesh'"));
        assert!(body.contains("name='has_lyrics' checked"));
    }

    #[tokio::test]
    async fn invalid_tune_never_calls_the_backend() {
        let mut backend = MockBackend::new();
        backend.expect_create_tune().never();
        let app = TestApp::new(backend);
        let seeded = seed_session(&app.sessions, true).await;

        let resp = app.post_form("/tune/create", &seeded, "title=&styles=").await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn expired_backend_credential_logs_the_user_out() {
        let mut backend = MockBackend::new();
        backend
            .expect_create_tune()
            .times(1)
            .returning(|_, _| ApiOutcome::Unauthorized);
        let app = TestApp::new(backend);
        let seeded = seed_session(&app.sessions, true).await;

        let resp = app.post_form("/tune/create", &seeded, VALID_TUNE).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[LOCATION], LOGIN_PATH);
        let session = app.session(&seeded.token).await;
        assert!(session.credential().await.is_none());
        assert_eq!(session.pop_flash().await.as_deref(), Some(EXPIRED_FLASH));
    }
}
