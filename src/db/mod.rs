pub mod companies;
pub mod ledger;
pub mod schema;
pub mod students;
pub mod users;
