pub mod auth;
pub mod documents;
pub mod history;
pub mod reports;
pub mod tenancy;
