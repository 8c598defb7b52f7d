//! API middleware: caller identity and anonymous cookies

pub mod cookies;
pub mod identity;

pub use cookies::{anonymous_data_cookie, read_anonymous_data, ANONYMOUS_DATA_COOKIE, ANONYMOUS_ID_COOKIE};
pub use identity::{IdentityExt, IdentityMiddleware};
