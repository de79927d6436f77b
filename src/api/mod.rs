//! HTTP surface: `/view-file`, `/merge`, `/signed-url` and `/health`

mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;
pub(crate) mod utils;
mod validation;

pub use error::ApiError;
pub use server::{router, run};
pub use services::REQUEST_ID_HEADER;
pub use state::AppState;
