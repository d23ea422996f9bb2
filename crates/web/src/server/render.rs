//! Minimal HTML rendering for the front end's pages.
//!
//! Every interpolated value goes through `htmlescape`. Password fields are
//! never written back into a page.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::{Datelike, Utc};
use common::{protocol::Tune, FormSubmission};
use htmlescape::encode_minimal;

use crate::server::middleware::CSRF_FORM_FIELD;
use crate::session::Session;

/// Pages the front end can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    Transcriptions,
    Signup,
    Login,
    Activate,
    TuneCreate,
    TuneView,
}

impl Page {
    fn title(self) -> &'static str {
        match self {
            Page::Home => "Home",
            Page::Transcriptions => "Transcriptions",
            Page::Signup => "Signup",
            Page::Login => "Login",
            Page::Activate => "Activate Account",
            Page::TuneCreate => "Create a New Tune",
            Page::TuneView => "Tune",
        }
    }
}

/// Form values that may be shown again after a failed submission.
pub trait FormFields {
    /// Field name → value pairs to pre-fill. Password fields must be omitted.
    fn redisplay(&self) -> Vec<(&'static str, String)>;
}

/// Render-ready snapshot of a form: values to pre-fill plus its errors.
#[derive(Debug, Clone, Default)]
pub struct FormView {
    values: BTreeMap<&'static str, String>,
    field_errors: BTreeMap<String, String>,
    non_field_errors: Vec<String>,
}

impl FormView {
    pub fn from_submission<F: FormFields>(form: &FormSubmission<F>) -> Self {
        Self {
            values: form.values().redisplay().into_iter().collect(),
            field_errors: form.validator().field_errors().clone(),
            non_field_errors: form.validator().non_field_errors().to_vec(),
        }
    }

    /// A form pre-filled with `values` and no errors.
    pub fn prefilled<F: FormFields>(values: &F) -> Self {
        Self {
            values: values.redisplay().into_iter().collect(),
            ..Self::default()
        }
    }

    fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or_default()
    }
}

/// Everything a page needs besides its own content.
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: String,
    pub form: FormView,
    pub tune: Option<Tune>,
}

impl TemplateData {
    /// Collect the per-request values from the session.
    ///
    /// Consumes the flash message, if any.
    pub async fn new(session: &Session) -> Self {
        Self {
            current_year: Utc::now().year(),
            flash: session.pop_flash().await,
            is_authenticated: session.is_authenticated().await,
            csrf_token: session.csrf_token().await,
            form: FormView::default(),
            tune: None,
        }
    }

    pub fn with_form(mut self, form: FormView) -> Self {
        self.form = form;
        self
    }

    pub fn with_tune(mut self, tune: Tune) -> Self {
        self.tune = Some(tune);
        self
    }
}

/// Render `page` as a complete HTML response with `status`.
pub fn render(page: Page, status: StatusCode, data: &TemplateData) -> Response {
    (status, Html(page_html(page, data))).into_response()
}

fn page_html(page: Page, data: &TemplateData) -> String {
    let mut out = String::with_capacity(2048);
    let _ = write!(
        out,
        "<!doctype html>\n<html lang='en'>\n<head><meta charset='utf-8'><title>{} - Jambuster</title></head>\n<body>\n",
        page.title()
    );
    out.push_str("<header><h1><a href='/'>Jambuster</a></h1></header>\n");
    nav(&mut out, data);
    out.push_str("<main>\n");
    if let Some(flash) = &data.flash {
        let _ = writeln!(out, "<div class='flash'>{}</div>", encode_minimal(flash));
    }
    match page {
        Page::Home => {
            out.push_str("<h2>Latest Tunes</h2>\n<p>There's nothing to see here... yet!</p>\n")
        }
        Page::Transcriptions => {
            out.push_str("<h2>Transcriptions</h2>\n<p>Transcriptions are on their way.</p>\n")
        }
        Page::Signup => signup(&mut out, data),
        Page::Login => login(&mut out, data),
        Page::Activate => activate(&mut out, data),
        Page::TuneCreate => tune_create(&mut out, data),
        Page::TuneView => tune_view(&mut out, data),
    }
    out.push_str("</main>\n");
    let _ = write!(
        out,
        "<footer>&copy; {} Jambuster</footer>\n</body>\n</html>\n",
        data.current_year
    );
    out
}

fn nav(out: &mut String, data: &TemplateData) {
    out.push_str("<nav>\n<div><a href='/'>Home</a> <a href='/transcriptions'>Transcriptions</a>");
    if data.is_authenticated {
        out.push_str(" <a href='/tune/create'>Create tune</a>");
    }
    out.push_str("</div>\n<div>");
    if data.is_authenticated {
        form_open(out, "/user/logout", data);
        out.push_str("<button>Logout</button></form>");
    } else {
        out.push_str(
            "<a href='/user/signup'>Signup</a> <a href='/user/activate'>Activate</a> <a href='/user/login'>Login</a>",
        );
    }
    out.push_str("</div>\n</nav>\n");
}

fn form_open(out: &mut String, action: &str, data: &TemplateData) {
    let _ = write!(
        out,
        "<form action='{action}' method='POST' novalidate><input type='hidden' name='{CSRF_FORM_FIELD}' value='{}'>",
        attr(&data.csrf_token)
    );
}

/// Escape a value for a single-quoted attribute.
fn attr(value: &str) -> String {
    encode_minimal(value)
        .replace('\'', "&#x27;")
        .replace('"', "&quot;")
}

fn non_field_errors(out: &mut String, form: &FormView) {
    for message in &form.non_field_errors {
        let _ = writeln!(out, "<div class='error'>{}</div>", encode_minimal(message));
    }
}

fn input(out: &mut String, form: &FormView, name: &str, label: &str, kind: &str) {
    out.push_str("<div>");
    let _ = write!(out, "<label for='{name}'>{label}:</label>");
    if let Some(message) = form.field_errors.get(name) {
        let _ = write!(out, "<label class='error'>{}</label>", encode_minimal(message));
    }
    match kind {
        "password" => {
            let _ = write!(out, "<input type='password' id='{name}' name='{name}'>");
        }
        "checkbox" => {
            let checked = if form.value(name).is_empty() { "" } else { " checked" };
            let _ = write!(out, "<input type='checkbox' id='{name}' name='{name}'{checked}>");
        }
        _ => {
            let _ = write!(
                out,
                "<input type='{kind}' id='{name}' name='{name}' value='{}'>",
                attr(form.value(name))
            );
        }
    }
    out.push_str("</div>\n");
}

fn signup(out: &mut String, data: &TemplateData) {
    form_open(out, "/user/signup", data);
    out.push('\n');
    non_field_errors(out, &data.form);
    input(out, &data.form, "name", "Name", "text");
    input(out, &data.form, "email", "Email", "email");
    input(out, &data.form, "password", "Password", "password");
    out.push_str("<div><input type='submit' value='Signup'></div>\n</form>\n");
}

fn login(out: &mut String, data: &TemplateData) {
    form_open(out, "/user/login", data);
    out.push('\n');
    non_field_errors(out, &data.form);
    input(out, &data.form, "email", "Email", "email");
    input(out, &data.form, "password", "Password", "password");
    out.push_str("<div><input type='submit' value='Login'></div>\n</form>\n");
}

fn activate(out: &mut String, data: &TemplateData) {
    form_open(out, "/user/activate", data);
    out.push('\n');
    non_field_errors(out, &data.form);
    input(out, &data.form, "token", "Activation token", "text");
    out.push_str("<div><input type='submit' value='Activate'></div>\n</form>\n");
}

fn tune_create(out: &mut String, data: &TemplateData) {
    form_open(out, "/tune/create", data);
    out.push('\n');
    non_field_errors(out, &data.form);
    input(out, &data.form, "title", "Title", "text");
    input(out, &data.form, "styles", "Styles (comma separated)", "text");
    input(out, &data.form, "keys", "Keys (comma separated)", "text");
    input(out, &data.form, "time_signature", "Time signature", "text");
    input(out, &data.form, "structure", "Structure", "text");
    input(out, &data.form, "has_lyrics", "Has lyrics", "checkbox");
    out.push_str("<div><input type='submit' value='Create tune'></div>\n</form>\n");
}

fn tune_view(out: &mut String, data: &TemplateData) {
    let Some(tune) = &data.tune else {
        return;
    };
    let _ = write!(
        out,
        "<div class='tune'>\n<h2>{}</h2>\n<span>#{}</span>\n<table>\n",
        encode_minimal(&tune.title),
        tune.id
    );
    let rows = [
        ("Styles", tune.styles.join(", ")),
        ("Keys", tune.keys.join(", ")),
        ("Time signature", tune.time_signature.clone()),
        ("Structure", tune.structure.clone()),
        ("Lyrics", if tune.has_lyrics { "Yes" } else { "No" }.to_owned()),
    ];
    for (label, value) in rows {
        let _ = writeln!(out, "<tr><th>{label}</th><td>{}</td></tr>", encode_minimal(&value));
    }
    out.push_str("</table>\n</div>\n");
}
