//! Anonymous visitor cookies
//!
//! `anonymous_id` carries the visitor's UUID. `anonymous_data` carries the
//! usage record as percent-encoded JSON (`{"used":n}`), the shape browser
//! code writes with `encodeURIComponent`.

use actix_web::cookie::{Cookie, SameSite};
use actix_web::HttpRequest;
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};

use crate::domain::AnonymousData;

pub const ANONYMOUS_ID_COOKIE: &str = "anonymous_id";
pub const ANONYMOUS_DATA_COOKIE: &str = "anonymous_data";

pub fn encode_anonymous_data(data: &AnonymousData) -> String {
    let json = serde_json::to_string(data).unwrap_or_else(|_| format!("{{\"used\":{}}}", data.used));
    utf8_percent_encode(&json, NON_ALPHANUMERIC).to_string()
}

/// Missing or unreadable records count as a fresh visitor
pub fn decode_anonymous_data(raw: &str) -> AnonymousData {
    let mut value = raw.to_string();
    // Cookie layers may or may not have decoded the value already
    for _ in 0..3 {
        if let Ok(data) = serde_json::from_str::<AnonymousData>(&value) {
            return data;
        }
        match percent_decode_str(&value).decode_utf8() {
            Ok(decoded) if decoded != value.as_str() => value = decoded.into_owned(),
            _ => break,
        }
    }
    AnonymousData::default()
}

pub fn read_anonymous_data(req: &HttpRequest) -> AnonymousData {
    req.cookie(ANONYMOUS_DATA_COOKIE)
        .map(|cookie| decode_anonymous_data(cookie.value()))
        .unwrap_or_default()
}

pub fn anonymous_data_cookie(data: &AnonymousData, secure: bool) -> Cookie<'static> {
    Cookie::build(ANONYMOUS_DATA_COOKIE, encode_anonymous_data(data))
        .path("/")
        .permanent()
        .same_site(SameSite::Lax)
        .secure(secure)
        .finish()
}

pub fn anonymous_id_cookie(id: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(ANONYMOUS_ID_COOKIE, id.to_string())
        .path("/")
        .permanent()
        .same_site(SameSite::Lax)
        .http_only(true)
        .secure(secure)
        .finish()
}
