pub mod consumption_queries;
pub mod rate_queries;
