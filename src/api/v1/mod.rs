/*
 * Responsibility
 * - v1 の公開ポイント (routes() の re-export など)
 */
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod policies;
mod routes;

pub use routes::routes;
