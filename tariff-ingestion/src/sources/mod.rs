pub mod api;

pub use api::ApiSource;
