// Library entrypoint for the server binary and integration tests.
pub mod api;
pub mod config;
pub mod i18n;
pub mod shutdown;
pub mod state;
pub mod storage;

pub use api::{build_app, build_router};
