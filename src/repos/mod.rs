pub mod error;
pub mod volcano_repo;
