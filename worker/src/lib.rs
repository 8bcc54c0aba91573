pub mod app_state;
pub mod axum_http;
pub mod config;
pub mod services;
pub mod usecases;

#[cfg(test)]
pub(crate) mod test_support;
