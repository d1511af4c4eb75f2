pub mod auth;
pub mod companies;
pub mod students;
pub mod tx;
pub mod utils;
