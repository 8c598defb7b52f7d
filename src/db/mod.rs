//! PostgreSQL backend for profiles, job history, packages and session tokens
//!
//! Schema lives in `migrations/0001_init.sql`. A trigger notifies
//! `profile_changed` on every profile write; `listener` turns those
//! notifications into subscription pushes.

pub mod listener;
pub mod packages;
pub mod pool;
pub mod profiles;
pub mod tokens;

pub use listener::spawn_profile_listener;
pub use packages::PgPackageCatalog;
pub use pool::DbPool;
pub use profiles::PgProfileStore;
pub use tokens::SessionTokenRepository;
