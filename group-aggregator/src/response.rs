use crate::payload::{Content, Payload};
use chrono::{DateTime, Utc};
use http::StatusCode;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue, LAST_MODIFIED};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use std::convert::Infallible;

/// Response from a single member repository
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberResponse {
    pub status: StatusCode,
    pub payload: Option<Payload>,
}

impl MemberResponse {
    pub fn new(status: StatusCode, payload: Option<Payload>) -> Self {
        Self { status, payload }
    }

    pub fn ok(payload: impl Into<Payload>) -> Self {
        Self::new(StatusCode::OK, Some(payload.into()))
    }

    pub fn status(status: StatusCode) -> Self {
        Self::new(status, None)
    }

    pub fn not_found() -> Self {
        Self::status(StatusCode::NOT_FOUND)
    }

    /// Consumes the response, returning the payload only for a 200 with a body
    pub fn into_usable_payload(self) -> Option<Payload> {
        match self.status {
            StatusCode::OK => self.payload,
            _ => None,
        }
    }
}

/// Final response produced for a group request.
///
/// `Ok(None)` is an empty-body success and is distinct from `NotFound`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Ok(Option<Content>),
    NotFound,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        match self {
            Response::Ok(_) => StatusCode::OK,
            Response::NotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn content(&self) -> Option<&Content> {
        match self {
            Response::Ok(content) => content.as_ref(),
            Response::NotFound => None,
        }
    }

    pub fn into_content(self) -> Option<Content> {
        match self {
            Response::Ok(content) => content,
            Response::NotFound => None,
        }
    }

    /// Converts into a member response so a nested group can be merged by its parent
    pub fn into_member_response(self) -> MemberResponse {
        let status = self.status();
        MemberResponse::new(status, self.into_content().map(Payload::Content))
    }

    /// Builds the HTTP response written back to the client.
    pub fn into_http(self) -> http::Response<BoxBody<Bytes, Infallible>> {
        let status = self.status();
        let content = self.into_content();

        let mut response = match &content {
            Some(content) => http::Response::new(Full::new(content.body().clone()).boxed()),
            None => http::Response::new(Empty::<Bytes>::new().boxed()),
        };
        *response.status_mut() = status;

        let Some(content) = content else {
            return response;
        };

        let headers = response.headers_mut();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(content.body().len()));

        if let Some(content_type) = content.attributes().content_type() {
            match HeaderValue::from_str(content_type) {
                Ok(value) => {
                    headers.insert(CONTENT_TYPE, value);
                }
                Err(e) => {
                    tracing::warn!(content_type, error = %e, "Dropping invalid content type");
                }
            }
        }

        if let Some(last_modified) = content.attributes().last_modified()
            && let Ok(value) = HeaderValue::from_str(&http_date(last_modified))
        {
            headers.insert(LAST_MODIFIED, value);
        }

        response
    }
}

/// Formats a timestamp as an IMF-fixdate, the form used by `Last-Modified`
pub fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
