//! Axum router construction.

use axum::{
    routing::{get, post},
    Router,
};

use super::{handlers, middleware, state::AppState, tunes, users};

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(handlers::home))
        .route("/transcriptions", get(handlers::transcriptions))
        .route("/user/signup", get(users::signup).post(users::signup_post))
        .route("/user/activate", get(users::activate).post(users::activate_post))
        .route("/user/login", get(users::login).post(users::login_post));

    // The gate wraps these routes' 405 fallback too, so anonymous visitors
    // are sent to log in before the method is checked.
    let protected = middleware::protected(
        Router::new()
            .route("/user/logout", post(users::logout_post))
            .route("/tune/create", get(tunes::create).post(tunes::create_post))
            .route("/tune/view/:id", get(tunes::view)),
    );

    let pages = middleware::dynamic(public.merge(protected), state.sessions.clone())
        .fallback(handlers::not_found);

    middleware::standard(pages).with_state(state)
}
