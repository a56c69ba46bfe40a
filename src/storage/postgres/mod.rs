mod db;
mod media_repo;
mod outbox_repo;

pub use db::connect;
pub use media_repo::MediaRepo;
pub use outbox_repo::{OutboxRecord, OutboxRepo};
