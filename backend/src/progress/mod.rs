pub mod model;
pub mod reward;
pub mod service;
pub mod store;
pub mod store_memory;
pub mod store_sqlx;
