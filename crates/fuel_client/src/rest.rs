use async_trait::async_trait;
use fuel_core::prelude::*;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use std::path::Path;
use tracing::{debug, warn};
use url::Url;

pub const PRIVATE_TOKEN_HEADER: &str = "Private-token";

/// The [`Transport`] that talks to real Fuel servers.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
}

impl RestClient {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(Policy::limited(3))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    async fn form(&self, fields: Vec<(String, String)>) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for (key, value) in fields {
            let Some(attachment) = value.strip_prefix('@') else {
                form = form.text(key, value);
                continue;
            };

            let (path, upload_name) = match attachment.split_once(';') {
                Some((path, name)) => (path, name.to_string()),
                None => (
                    attachment,
                    Path::new(attachment)
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                ),
            };
            let data = tokio::fs::read(path)
                .await
                .map_err(|source| TransportError::Attachment {
                    path: path.into(),
                    source,
                })?;
            let mime = match mime_guess::from_path(path).first_raw() {
                Some(mime) => mime,
                None => {
                    warn!("Unknown MIME type for [{path}], sending it as application/octet-stream");
                    "application/octet-stream"
                }
            };
            let part = Part::bytes(data)
                .file_name(upload_name)
                .mime_str(mime)
                .map_err(|e| TransportError::Network(e.to_string()))?;
            form = form.part(key, part);
        }
        Ok(form)
    }
}

/// Joins `<base>/<api version>/<path>`, encoding each path segment once.
pub fn build_url(base_url: &str, api_version: &str, path: &str) -> Result<Url, TransportError> {
    let mut joined = base_url.trim_end_matches('/').to_string();
    let version = api_version.trim_matches('/');
    if !version.is_empty() {
        joined.push('/');
        joined.push_str(version);
    }
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let decoded = urlencoding::decode(segment)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        joined.push('/');
        joined.push_str(&urlencoding::encode(&decoded));
    }
    Url::parse(&joined).map_err(|e| TransportError::InvalidUrl(format!("{joined}: {e}")))
}

/// Adds the server's private token unless the caller already set one.
pub(crate) fn auth_request(request: RestRequest, server: &ServerConfig) -> RestRequest {
    if server.api_key().is_empty() || request.has_header(PRIVATE_TOKEN_HEADER) {
        request
    } else {
        request.header(PRIVATE_TOKEN_HEADER, server.api_key())
    }
}

#[async_trait]
impl Transport for RestClient {
    async fn request(&self, request: RestRequest) -> Result<RestResponse, TransportError> {
        let url = build_url(&request.base_url, &request.api_version, &request.path)?;
        debug!("{:?} {url}", request.method);

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post | HttpMethod::PostForm => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Patch | HttpMethod::PatchForm => self.client.patch(url),
            HttpMethod::Delete => self.client.delete(url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if matches!(request.method, HttpMethod::PostForm | HttpMethod::PatchForm) {
            builder = builder.multipart(self.form(request.form).await?);
        } else if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let mut out = RestResponse::new(response.status().as_u16(), bytes::Bytes::new());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                out.set_header(name.as_str(), value);
            }
        }
        out.body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(out)
    }
}
