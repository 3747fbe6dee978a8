pub mod admin;
pub mod analyze;
pub mod health;
