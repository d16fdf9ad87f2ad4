pub mod store;
pub use store::{
    DocumentStore, HistoryStore, MembershipStore, ResourceDirectory, Stores, TenantStore,
    UserStore,
};

pub mod user_repo;
pub use user_repo::UserRepository;
pub mod tenancy_repo;
pub use tenancy_repo::TenantRepository;
pub mod membership_repo;
pub use membership_repo::MembershipRepository;
pub mod history_repo;
pub use history_repo::HistoryRepository;
pub mod document_repo;
pub use document_repo::DocumentRepository;

pub mod memory;
pub use memory::MemoryStore;
