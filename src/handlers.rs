pub mod health;
pub mod auth;
pub mod tenancy;
pub mod documents;
