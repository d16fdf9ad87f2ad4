pub mod auth;
pub mod access_guard;
pub mod numbering;
pub mod consistency;
pub mod document_service;
pub mod membership_service;
pub mod migration_service;
pub mod repair_service;
