use crate::error::*;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    /// POST with a multipart form body.
    PostForm,
    Put,
    Patch,
    /// PATCH with a multipart form body.
    PatchForm,
    Delete,
}

/// A request against a Fuel server, before it is turned into wire bytes.
///
/// The final url is `<base_url>/<api_version>/<path>`, with empty parts skipped.
/// Form values starting with `@` name a local file to attach: `@<path>[;<upload name>]`.
#[derive(Debug, Clone)]
pub struct RestRequest {
    pub method: HttpMethod,
    pub base_url: String,
    pub api_version: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub form: Vec<(String, String)>,
}

impl RestRequest {
    pub fn new(
        method: HttpMethod,
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            method,
            base_url: base_url.into(),
            api_version: api_version.into(),
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            form: Vec::new(),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn form_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestResponse {
    pub status: u16,
    pub body: Bytes,
    /// Keys are stored lower-cased.
    headers: HashMap<String, String>,
}

impl RestResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The HTTP collaborator of the Fuel client.
///
/// Implementations must percent-encode path segments and surface response headers.
/// A non-200 status is a successful [`RestResponse`], only failures to talk to the
/// server at all are errors.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn request(&self, request: RestRequest) -> Result<RestResponse, TransportError>;
}
