pub type Error = axum_core::Error;
pub type Body = axum_core::body::Body;
pub type Request = ::http::Request<Body>;
pub type Response = ::http::Response<Body>;
pub use ::http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header, status, uri,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::*;

#[derive(thiserror::Error, Debug)]
pub enum BodyError {
	#[error("request body exceeds the configured limit")]
	TooLarge,
	#[error("failed to read request body: {0}")]
	Read(Box<dyn std::error::Error + Send + Sync>),
}

/// Buffers a body fully into memory, failing once it exceeds `limit` bytes.
pub async fn read_body(body: Body, limit: usize) -> Result<Bytes, BodyError> {
	match Limited::new(body, limit).collect().await {
		Ok(collected) => Ok(collected.to_bytes()),
		Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => Err(BodyError::TooLarge),
		Err(err) => Err(BodyError::Read(err)),
	}
}

pub fn empty_response(code: StatusCode) -> Response {
	::http::Response::builder()
		.status(code)
		.body(Body::empty())
		.expect("builder with known status code should not fail")
}

pub fn plaintext_response(code: StatusCode, body: String) -> Response {
	::http::Response::builder()
		.status(code)
		.header(header::CONTENT_TYPE, "text/plain")
		.body(body.into())
		.expect("builder with known status code should not fail")
}

pub fn json_response<T: serde::Serialize>(code: StatusCode, payload: &T) -> Response {
	let body = match serde_json::to_vec(payload) {
		Ok(b) => b,
		Err(err) => {
			error!(%err, "failed to serialize response payload");
			return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
		},
	};
	::http::Response::builder()
		.status(code)
		.header(header::CONTENT_TYPE, "application/json")
		.body(body.into())
		.expect("builder with known status code should not fail")
}

#[derive(Debug, PartialEq, Eq)]
pub enum WellKnownContentTypes {
	Json,
	Unspecified,
	Other,
}

pub fn classify_content_type(headers: &HeaderMap) -> WellKnownContentTypes {
	let Some(content_type) = headers.get(header::CONTENT_TYPE) else {
		return WellKnownContentTypes::Unspecified;
	};
	let Ok(content_type) = content_type.to_str() else {
		return WellKnownContentTypes::Other;
	};
	let essence = content_type
		.split(';')
		.next()
		.unwrap_or_default()
		.trim();
	if essence.eq_ignore_ascii_case("application/json") {
		WellKnownContentTypes::Json
	} else {
		WellKnownContentTypes::Other
	}
}
