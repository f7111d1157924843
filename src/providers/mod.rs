pub mod rest_api;
pub mod util;

#[cfg(test)]
pub(crate) mod mock;

pub use rest_api::RestApiClient;
