//! Shared building blocks for `jambuster-web`: the backend API contract and
//! form validation.

pub mod protocol;
pub mod validator;

pub use protocol::ApiRejection;
pub use validator::{FormSubmission, Validator};
