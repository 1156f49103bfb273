//! Publishing models: uploads, patches and the license table they need.

use crate::client::FuelClient;
use crate::error::{FuelClientError, Result};
use crate::json;

use fuel_core::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use tracing::{error, info, instrument, warn};
use walkdir::WalkDir;

/// License id sent when a model does not name one ("Creative Commons - Public Domain").
const DEFAULT_LICENSE_ID: &str = "1";

impl FuelClient {
    /// Uploads the model directory at `path` as a new model on `id`'s server.
    #[instrument(skip(self, path, id), fields(model = %id.unique_name()))]
    pub async fn upload_model(
        &self,
        path: impl AsRef<Path>,
        id: &ModelIdentifier,
        private: bool,
        owner: Option<&str>,
    ) -> FuelResult {
        let form = match self.fill_model_form(path.as_ref(), id, private, owner).await {
            Ok(form) => form,
            Err(e) => {
                error!("Unable to prepare the upload: {e}");
                return ResultType::UploadError.into();
            }
        };

        let server = id.server();
        let categories = form
            .iter()
            .find(|(key, _)| key == "categories")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();
        let mut request =
            RestRequest::new(HttpMethod::PostForm, server.url_string(), server.version(), "models");
        request.form = form;

        match self.send(request, server).await {
            Ok(response) if response.is_ok() => {
                info!("Uploaded model [{}]", id.unique_name());
                ResultType::Upload.into()
            }
            Ok(response) if response.status == 409 => {
                warn!("Model [{}] already exists", id.unique_name());
                ResultType::UploadAlreadyExists.into()
            }
            Ok(response) => {
                error!(
                    "Failed to upload model.\n  Server: {}\n  Server API Version: {}\n  Route: /models\n  Categories: {categories}\n  REST response code: {}\n\n\
                     Check that the server url is correct, that the categories exist on the server, \
                     and that you may publish for the requested owner.",
                    server.url_string(),
                    server.version(),
                    response.status
                );
                ResultType::UploadError.into()
            }
            Err(e) => {
                error!("Failed to upload model: {e}");
                ResultType::UploadError.into()
            }
        }
    }

    /// Changes a published model. Without a directory only the private flag
    /// of `id` is sent; with one, the whole model form is.
    #[instrument(skip(self, id, path), fields(model = %id.unique_name()))]
    pub async fn patch_model(&self, id: &ModelIdentifier, path: Option<&Path>) -> FuelResult {
        let form = match path {
            Some(path) => match self.fill_model_form(path, id, id.private(), Some(id.owner())).await {
                Ok(form) => form,
                Err(e) => {
                    error!("Unable to prepare the patch: {e}");
                    return ResultType::PatchError.into();
                }
            },
            None => vec![("private".to_string(), private_flag(id.private()).to_string())],
        };

        let server = id.server();
        let route = format!("{}/models/{}", id.owner(), id.name());
        let mut request =
            RestRequest::new(HttpMethod::PatchForm, server.url_string(), server.version(), route);
        request.form = form;

        match self.send(request, server).await {
            Ok(response) if response.is_ok() => ResultType::Patch.into(),
            Ok(response) => {
                warn!("Patch of [{}] failed with status {}", id.unique_name(), response.status);
                ResultType::PatchError.into()
            }
            Err(e) => {
                error!("Patch of [{}] failed: {e}", id.unique_name());
                ResultType::PatchError.into()
            }
        }
    }

    /// Fetches the license names and ids of `server`. The table is kept for
    /// the lifetime of the client and its clones.
    pub async fn populate_licenses(&self, server: &ServerConfig) -> Result<()> {
        let request = RestRequest::new(HttpMethod::Get, server.url_string(), server.version(), "licenses");
        let response = self.send(request, server).await?;
        if !response.is_ok() {
            return Err(FuelClientError::ServerError(response.status, response.text()));
        }
        let licenses = json::parse_licenses(&response.body);
        if licenses.is_empty() {
            return Err(FuelClientError::Validation(format!(
                "failed to parse license information [{}]",
                response.text()
            )));
        }
        self.licenses.lock().await.extend(licenses);
        Ok(())
    }

    /// Known license names and their server ids.
    pub async fn licenses(&self) -> HashMap<String, u32> {
        self.licenses.lock().await.clone()
    }

    /// The multipart form describing the model directory at `path`.
    ///
    /// Values starting with `@` are file attachments: `@<absolute path>;<path in model>`.
    pub async fn fill_model_form(
        &self,
        path: &Path,
        id: &ModelIdentifier,
        private: bool,
        owner: Option<&str>,
    ) -> Result<Vec<(String, String)>> {
        if !path.is_dir() {
            return Err(FuelClientError::Validation(format!(
                "the model path [{}] doesn't exist",
                path.display()
            )));
        }
        let meta = FuelMetadata::load_from_dir(path)?;

        let mut form = vec![
            field("name", meta.name),
            field("description", meta.description),
            field("private", private_flag(private)),
        ];
        if let Some(owner) = owner.filter(|owner| !owner.is_empty()) {
            form.push(field("owner", owner));
        }

        let license = match &meta.license {
            Some(license) => self.license_id(license, id.server()).await?,
            None => DEFAULT_LICENSE_ID.to_string(),
        };
        form.push(field("license", license));

        let tags: String = meta.tags.iter().map(|tag| format!("{tag},")).collect();
        if !tags.is_empty() {
            form.push(field("tags", tags));
        }

        if let Some(categories) = meta.categories {
            let joined = [categories.first, categories.second]
                .into_iter()
                .filter(|category| !category.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            if !joined.is_empty() {
                form.push(field("categories", joined));
            }
        }

        for (key, value) in &meta.annotations {
            let annotation = serde_json::json!({ "key": key, "value": value });
            form.push(field("metadata", annotation.to_string()));
        }

        let root = std::path::absolute(path).map_err(MetadataError::Io)?;
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| MetadataError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            form.push(field(
                "file",
                format!("@{};{relative}", entry.path().display()),
            ));
        }
        Ok(form)
    }

    async fn license_id(&self, license: &str, server: &ServerConfig) -> Result<String> {
        if self.licenses.lock().await.is_empty() {
            self.populate_licenses(server).await?;
        }

        let licenses = self.licenses.lock().await;
        if let Some(id) = licenses.get(license) {
            return Ok(id.to_string());
        }
        let mut valid: Vec<&str> = licenses.keys().map(String::as_str).collect();
        valid.sort_unstable();
        Err(FuelClientError::Validation(format!(
            "invalid license [{license}]. Valid licenses include:\n    {}",
            valid.join("\n    ")
        )))
    }
}

fn field(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

fn private_flag(private: bool) -> &'static str {
    if private { "1" } else { "0" }
}
