use async_trait::async_trait;
use axum::extract::{FromRequest, RequestParts};
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::Error;

pub const CALLER_HEADER: &str = "x-user-id";

/// Identity is verified upstream; requests arrive carrying the caller's id in a header.
#[async_trait]
impl<B: Send> FromRequest<B> for Caller {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let id = req
            .headers()
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(Error::unauthorized)?;

        Ok(Caller::new(id))
    }
}

#[cfg(test)]
fn extract(request: axum::http::Request<()>) -> Result<Caller, Error> {
    let mut parts = RequestParts::new(request);
    tokio_test::block_on(Caller::from_request(&mut parts))
}

#[test]
fn caller_comes_from_the_header() {
    let id = Uuid::new_v4();
    let request = axum::http::Request::builder()
        .header(CALLER_HEADER, id.to_string())
        .body(())
        .unwrap();

    assert_eq!(extract(request).unwrap(), Caller::new(id));
}

#[test]
fn missing_or_malformed_header_is_unauthorized() {
    let missing = axum::http::Request::builder().body(()).unwrap();
    assert_eq!(extract(missing).unwrap_err(), Error::unauthorized());

    let malformed = axum::http::Request::builder()
        .header(CALLER_HEADER, "not-a-uuid")
        .body(())
        .unwrap();
    assert_eq!(extract(malformed).unwrap_err(), Error::unauthorized());
}
