//! Page handlers that need no backend data, plus helpers shared by the form
//! handlers in [`super::users`] and [`super::tunes`].

use axum::{
    extract::rejection::FormRejection,
    http::StatusCode,
    response::Response,
    Form,
};
use common::{ApiRejection, FormSubmission};

use super::render::{render, FormFields, FormView, Page, TemplateData};
use crate::error::{status_page, AppError};
use crate::session::Session;

/// Shown when the backend rejects a submission without saying why.
pub(super) const GENERIC_REJECTION: &str = "Your submission could not be processed";

/// `GET /`
pub async fn home(session: Session) -> Response {
    let data = TemplateData::new(&session).await;
    render(Page::Home, StatusCode::OK, &data)
}

/// `GET /transcriptions`
pub async fn transcriptions(session: Session) -> Response {
    let data = TemplateData::new(&session).await;
    render(Page::Transcriptions, StatusCode::OK, &data)
}

/// Fallback for unknown routes.
pub async fn not_found() -> Response {
    status_page(StatusCode::NOT_FOUND)
}

/// Unwrap a decoded form body, turning a malformed one into a 400.
pub(super) fn decode_form<T>(form: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    form.map(|Form(values)| values)
        .map_err(|rejection| AppError::BadForm(rejection.body_text()))
}

/// Render `page` with an empty form.
pub(super) async fn show_form(page: Page, session: &Session) -> Response {
    render(page, StatusCode::OK, &TemplateData::new(session).await)
}

/// Re-render `page` with the submitted values and their errors.
pub(super) async fn redisplay<F: FormFields>(
    page: Page,
    status: StatusCode,
    session: &Session,
    form: &FormSubmission<F>,
) -> Response {
    let data = TemplateData::new(session)
        .await
        .with_form(FormView::from_submission(form));
    render(page, status, &data)
}

/// Fold a backend rejection into `form`, making sure the form ends up
/// invalid even when the rejection carried nothing usable.
pub(super) fn reject<F>(form: &mut FormSubmission<F>, rejection: &ApiRejection) {
    form.merge_rejection(rejection);
    if form.valid() {
        form.add_non_field_error(GENERIC_REJECTION);
    }
}
