use crate::error::{FuelClientError, Result};
use crate::iter::{ModelIter, WorldIter};
use crate::json;
use crate::rest::{RestClient, auth_request};
use crate::url_parser::UrlParser;

use bytes::Bytes;
use fuel_cache::LocalCache;
use fuel_core::prelude::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Response header carrying the concrete version of a downloaded resource.
pub const RESOURCE_VERSION_HEADER: &str = "X-Ign-Resource-Version";

const MAX_REFERRALS: usize = 3;

/// Entry point to a set of Fuel servers and the local cache.
///
/// Cloning is cheap: clones share the transport and the license table.
#[derive(Clone)]
pub struct FuelClient {
    pub(crate) config: ClientConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cache: LocalCache,
    pub(crate) parser: UrlParser,
    pub(crate) licenses: Arc<Mutex<HashMap<String, u32>>>,
}

impl FuelClient {
    /// A client talking HTTP through [`RestClient`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = RestClient::new(config.user_agent())?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Ok(Self {
            parser: UrlParser::new(config.servers().to_vec())?,
            cache: LocalCache::new(&config),
            config,
            transport,
            licenses: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn parse_model_url(&self, url: &str) -> Option<ModelIdentifier> {
        self.parser.parse_model_url(url)
    }

    pub fn parse_world_url(&self, url: &str) -> Option<WorldIdentifier> {
        self.parser.parse_world_url(url)
    }

    pub fn parse_model_file_url(&self, url: &str) -> Option<(ModelIdentifier, String)> {
        self.parser.parse_model_file_url(url)
    }

    pub fn parse_world_file_url(&self, url: &str) -> Option<(WorldIdentifier, String)> {
        self.parser.parse_world_file_url(url)
    }

    pub fn parse_collection_url(&self, url: &str) -> Option<CollectionIdentifier> {
        self.parser.parse_collection_url(url)
    }

    pub(crate) async fn send(
        &self,
        request: RestRequest,
        server: &ServerConfig,
    ) -> Result<RestResponse> {
        Ok(self.transport.request(auth_request(request, server)).await?)
    }

    fn json_get(server: &ServerConfig, path: String) -> RestRequest {
        RestRequest::new(HttpMethod::Get, server.url_string(), server.version(), path)
            .header("Accept", "application/json")
    }

    /// Fresh metadata for a model. Always asks the server.
    #[instrument(skip(self, id), fields(model = %id.unique_name()))]
    pub async fn model_details(&self, id: &ModelIdentifier) -> (FuelResult, Option<ModelIdentifier>) {
        let path = format!("{}/models/{}", id.owner(), id.name());
        match self.send(Self::json_get(id.server(), path), id.server()).await {
            Ok(response) if response.is_ok() => match json::parse_model(&response.body, id.server()) {
                Some(details) => (ResultType::Fetch.into(), Some(details)),
                None => {
                    warn!("Unable to parse model details");
                    (ResultType::FetchError.into(), None)
                }
            },
            Ok(response) => {
                warn!("Model details request failed with status {}", response.status);
                (ResultType::FetchError.into(), None)
            }
            Err(e) => {
                error!("Model details request failed: {e}");
                (ResultType::FetchError.into(), None)
            }
        }
    }

    /// Fresh metadata for a world. Always asks the server.
    #[instrument(skip(self, id), fields(world = %id.unique_name()))]
    pub async fn world_details(&self, id: &WorldIdentifier) -> (FuelResult, Option<WorldIdentifier>) {
        let path = format!("{}/worlds/{}", id.owner(), id.name());
        match self.send(Self::json_get(id.server(), path), id.server()).await {
            Ok(response) if response.is_ok() => match json::parse_world(&response.body, id.server()) {
                Some(details) => (ResultType::Fetch.into(), Some(details)),
                None => {
                    warn!("Unable to parse world details");
                    (ResultType::FetchError.into(), None)
                }
            },
            Ok(response) => {
                warn!("World details request failed with status {}", response.status);
                (ResultType::FetchError.into(), None)
            }
            Err(e) => {
                error!("World details request failed: {e}");
                (ResultType::FetchError.into(), None)
            }
        }
    }

    /// Every model of `server`. When the first page cannot be loaded, the
    /// models cached for that server are returned instead.
    pub async fn models(&self, server: &ServerConfig) -> ModelIter {
        let iter = ModelIter::remote(self.transport.clone(), server.clone(), "models").await;
        if iter.is_valid() {
            return iter;
        }
        warn!(
            "Failed to fetch models from server [{}], returning cached models instead",
            server.url_string()
        );
        let mut id = ModelIdentifier::default();
        id.set_server(server.clone());
        ModelIter::from_items(self.cache.matching_models(&id))
    }

    /// Every world of `server`, with the same cache fallback as [`FuelClient::models`].
    pub async fn worlds(&self, server: &ServerConfig) -> WorldIter {
        let iter = WorldIter::remote(self.transport.clone(), server.clone(), "worlds").await;
        if iter.is_valid() {
            return iter;
        }
        warn!(
            "Failed to fetch worlds from server [{}], returning cached worlds instead",
            server.url_string()
        );
        let mut id = WorldIdentifier::default();
        id.set_server(server.clone());
        WorldIter::from_items(self.cache.matching_worlds(&id))
    }

    /// Models matching `id`. Cached matches are returned without asking the
    /// server; otherwise the owner's (or the single model's) listing is used.
    pub async fn models_for(&self, id: &ModelIdentifier) -> ModelIter {
        let cached: Vec<Model> = self.cache.matching_models(id).collect();
        if !cached.is_empty() {
            return ModelIter::from_items(cached);
        }
        let Some(path) = listing_path(id.owner(), "models", id.name()) else {
            return ModelIter::empty();
        };
        ModelIter::remote(self.transport.clone(), id.server().clone(), path).await
    }

    /// Worlds matching `id`, cache first like [`FuelClient::models_for`].
    pub async fn worlds_for(&self, id: &WorldIdentifier) -> WorldIter {
        let cached: Vec<WorldIdentifier> = self.cache.matching_worlds(id).collect();
        if !cached.is_empty() {
            return WorldIter::from_items(cached);
        }
        let Some(path) = listing_path(id.owner(), "worlds", id.name()) else {
            return WorldIter::empty();
        };
        WorldIter::remote(self.transport.clone(), id.server().clone(), path).await
    }

    pub async fn models_in_collection(&self, collection: &CollectionIdentifier) -> ModelIter {
        let path = format!("{}/collections/{}/models", collection.owner(), collection.name());
        ModelIter::remote(self.transport.clone(), collection.server().clone(), path).await
    }

    pub async fn worlds_in_collection(&self, collection: &CollectionIdentifier) -> WorldIter {
        let path = format!("{}/collections/{}/worlds", collection.owner(), collection.name());
        WorldIter::remote(self.transport.clone(), collection.server().clone(), path).await
    }

    /// Downloads a model and every model it transitively depends on.
    ///
    /// The returned path is the version directory of `id`. When a dependency
    /// fails, its result is returned.
    #[instrument(skip(self, id), fields(model = %id.unique_name()))]
    pub async fn download_model(&self, id: &ModelIdentifier) -> (FuelResult, Option<PathBuf>) {
        let (saved, path) = match self.fetch_model(id).await {
            Ok(found) => found,
            Err(e) => {
                error!("Failed to download model: {e}");
                return (fetch_failure(&e), None);
            }
        };

        let (result, _) = self.resolve_dependencies(&saved).await;
        if !result.is_ok() {
            return (result, Some(path));
        }
        (ResultType::Fetch.into(), Some(path))
    }

    pub async fn download_model_url(&self, url: &str) -> (FuelResult, Option<PathBuf>) {
        match self.parse_model_url(url) {
            Some(id) => self.download_model(&id).await,
            None => {
                error!("Unable to parse model url [{url}]");
                (ResultType::FetchError.into(), None)
            }
        }
    }

    /// Downloads a world, recording the concrete version and the local path on `id`.
    #[instrument(skip(self, id), fields(world = %id.unique_name()))]
    pub async fn download_world(&self, id: &mut WorldIdentifier) -> FuelResult {
        match self.fetch_world(id).await {
            Ok(_) => ResultType::Fetch.into(),
            Err(e) => {
                error!("Failed to download world: {e}");
                fetch_failure(&e)
            }
        }
    }

    pub async fn download_world_url(&self, url: &str) -> (FuelResult, Option<PathBuf>) {
        let Some(mut id) = self.parse_world_url(url) else {
            error!("Unable to parse world url [{url}]");
            return (ResultType::FetchError.into(), None);
        };
        let result = self.download_world(&mut id).await;
        (result, id.local_path().map(PathBuf::from))
    }

    /// Downloads one model archive and stores it in the cache, without its dependencies.
    pub(crate) async fn fetch_model(&self, id: &ModelIdentifier) -> Result<(ModelIdentifier, PathBuf)> {
        let route = format!(
            "{}/models/{}/{}/{}.zip",
            id.owner(),
            id.name(),
            id.version_str(),
            id.name()
        );
        info!("Downloading model [{}]", id.unique_name());
        let (version, data) = self.fetch_archive(id.server(), route).await?;

        let mut saved = id.clone();
        saved.set_version(version);
        let path = self.cache.save_model(&mut saved, data, true).await?;
        Ok((saved, path))
    }

    pub(crate) async fn fetch_world(&self, id: &mut WorldIdentifier) -> Result<PathBuf> {
        let route = format!(
            "{}/worlds/{}/{}/{}.zip",
            id.owner(),
            id.name(),
            id.version_str(),
            id.name()
        );
        info!("Downloading world [{}]", id.unique_name());
        let (version, data) = self.fetch_archive(id.server(), route).await?;

        id.set_version(version);
        Ok(self.cache.save_world(id, data, true).await?)
    }

    async fn fetch_archive(&self, server: &ServerConfig, route: String) -> Result<(u32, Bytes)> {
        if server.url().is_none() || server.version().is_empty() {
            return Err(FuelClientError::Validation(format!(
                "server configuration incomplete:\n{}",
                server.as_string("  ")
            )));
        }

        let request = RestRequest::new(HttpMethod::Get, server.url_string(), server.version(), route)
            .query("link", "true");
        let response = self.send(request, server).await?;
        if !response.is_ok() {
            return Err(FuelClientError::ServerError(response.status, response.text()));
        }

        let version = resource_version(&response);
        let data = self.zip_from_response(response).await?;
        Ok((version, data))
    }

    /// The archive bytes of a download response, following referral links.
    async fn zip_from_response(&self, mut response: RestResponse) -> Result<Bytes> {
        for _ in 0..=MAX_REFERRALS {
            let content_type = response.header("Content-Type").map(str::to_owned);
            match content_type.as_deref() {
                Some(kind) if kind.contains("text/plain") => {
                    let link = response.text().trim().to_string();
                    if Url::parse(&link).is_err() {
                        return Err(FuelClientError::Validation(format!(
                            "invalid referral link [{link}]"
                        )));
                    }
                    debug!("Downloading from a referral link [{link}]");
                    response = self
                        .transport
                        .request(RestRequest::new(HttpMethod::Get, link, "", ""))
                        .await?;
                    if !response.is_ok() {
                        return Err(FuelClientError::ServerError(response.status, response.text()));
                    }
                }
                None => return non_empty(response.body),
                Some(kind)
                    if kind.contains("application/zip")
                        || kind.contains("binary/octet-stream")
                        || kind.contains("application/octet-stream") =>
                {
                    return non_empty(response.body);
                }
                Some(kind) => {
                    return Err(FuelClientError::Validation(format!(
                        "unsupported content type [{kind}]"
                    )));
                }
            }
        }
        Err(FuelClientError::Validation("too many referral links".into()))
    }

    /// Direct dependencies of a cached model, read from its manifest.
    ///
    /// A model that is not cached has no known dependencies. Dependency urls
    /// that are not Fuel model urls are skipped.
    pub async fn model_dependencies(&self, id: &ModelIdentifier) -> (FuelResult, Vec<ModelIdentifier>) {
        let Some(model) = self.cache.matching_model(id) else {
            return (ResultType::Fetch.into(), Vec::new());
        };
        let Some(path) = model.path_to_model() else {
            return (ResultType::Fetch.into(), Vec::new());
        };

        let meta = match FuelMetadata::load_from_dir(path) {
            Ok(meta) => meta,
            Err(MetadataError::NotFound(_)) => return (ResultType::Fetch.into(), Vec::new()),
            Err(e) => {
                warn!("Unable to read the manifest of [{}]: {e}", id.unique_name());
                return (ResultType::FetchError.into(), Vec::new());
            }
        };

        let dependencies = meta
            .dependencies
            .iter()
            .filter_map(|uri| match self.parse_model_url(uri) {
                Some(dependency) => Some(dependency),
                None => {
                    warn!(
                        "Error resolving URL for dependency [{uri}] of model [{}]: Skipping",
                        id.unique_name()
                    );
                    None
                }
            })
            .collect();
        (ResultType::Fetch.into(), dependencies)
    }

    /// Every model `id` transitively depends on, downloading the ones that
    /// are not cached yet. Each model appears once.
    pub async fn resolve_dependencies(
        &self,
        id: &ModelIdentifier,
    ) -> (FuelResult, Vec<ModelIdentifier>) {
        let mut visited = HashSet::from([id.unique_name()]);
        let mut pending = VecDeque::from([id.clone()]);
        let mut resolved = Vec::new();

        while let Some(current) = pending.pop_front() {
            let (result, dependencies) = self.model_dependencies(&current).await;
            if !result.is_ok() {
                return (result, resolved);
            }
            for dependency in dependencies {
                if !visited.insert(dependency.unique_name()) {
                    continue;
                }
                if self.cache.matching_model(&dependency).is_none() {
                    if let Err(e) = self.fetch_model(&dependency).await {
                        error!("Failed to download dependency [{}]: {e}", dependency.unique_name());
                        return (fetch_failure(&e), resolved);
                    }
                }
                resolved.push(dependency.clone());
                pending.push_back(dependency);
            }
        }
        (ResultType::Fetch.into(), resolved)
    }

    /// Local path of the model named by `url`, if it is cached.
    pub fn cached_model(&self, url: &str) -> (FuelResult, Option<PathBuf>) {
        let found = self
            .parse_model_url(url)
            .and_then(|id| self.cache.matching_model(&id))
            .and_then(|model| model.path_to_model().map(PathBuf::from));
        cache_lookup(found)
    }

    /// Local path of the world named by `url`, if it is cached.
    pub fn cached_world(&self, url: &str) -> (FuelResult, Option<PathBuf>) {
        let found = self
            .parse_world_url(url)
            .and_then(|id| self.cache.matching_world(&id))
            .and_then(|world| world.local_path().map(PathBuf::from));
        cache_lookup(found)
    }

    /// Local path of the model file named by `url`, if it is cached.
    pub fn cached_model_file(&self, url: &str) -> (FuelResult, Option<PathBuf>) {
        let found = self.parse_model_file_url(url).and_then(|(id, file)| {
            let model = self.cache.matching_model(&id)?;
            file_under(model.path_to_model()?, &file)
        });
        cache_lookup(found)
    }

    /// Local path of the world file named by `url`, if it is cached.
    pub fn cached_world_file(&self, url: &str) -> (FuelResult, Option<PathBuf>) {
        let found = self.parse_world_file_url(url).and_then(|(id, file)| {
            let world = self.cache.matching_world(&id)?;
            file_under(world.local_path()?, &file)
        });
        cache_lookup(found)
    }

    /// The local path of any model, world, model-file or world-file url,
    /// downloading the resource when it is not cached.
    pub async fn fetch_resource(&self, url: &str) -> (FuelResult, Option<PathBuf>) {
        if let Some(id) = self.parse_model_url(url) {
            if let Some(path) = self.cache.matching_model(&id).and_then(|m| m.path_to_model().map(PathBuf::from)) {
                return (ResultType::FetchAlreadyExists.into(), Some(path));
            }
            return self.download_model(&id).await;
        }

        if let Some(mut id) = self.parse_world_url(url) {
            if let Some(world) = self.cache.matching_world(&id) {
                return (ResultType::FetchAlreadyExists.into(), world.local_path().map(PathBuf::from));
            }
            let result = self.download_world(&mut id).await;
            return (result, id.local_path().map(PathBuf::from));
        }

        if let Some((id, file)) = self.parse_model_file_url(url) {
            let cached = self.cached_model_file(url);
            if cached.0.is_ok() {
                return cached;
            }
            let (result, path) = self.download_model(&id).await;
            return file_in(result, path, &file);
        }

        if let Some((mut id, file)) = self.parse_world_file_url(url) {
            let cached = self.cached_world_file(url);
            if cached.0.is_ok() {
                return cached;
            }
            let result = self.download_world(&mut id).await;
            return file_in(result, id.local_path().map(PathBuf::from), &file);
        }

        error!("[{url}] is not a model, world, model file or world file url");
        (ResultType::FetchError.into(), None)
    }

    /// Downloads a newer version of every cached model the server has updated.
    pub async fn update_models(&self) -> Vec<(ModelIdentifier, FuelResult)> {
        let mut newest: HashMap<String, ModelIdentifier> = HashMap::new();
        for model in self.cache.all_models() {
            let id = model.into_identification();
            let key = id.unique_name();
            if newest.get(&key).is_none_or(|known| known.version() < id.version()) {
                newest.insert(key, id);
            }
        }

        let mut results = Vec::with_capacity(newest.len());
        for (_, cached) in newest {
            let (details, remote) = self.model_details(&cached).await;
            let result = match remote {
                Some(remote) if details.is_ok() && cached.version() < remote.version() => {
                    info!(
                        "Updating model [{}] up to version {}",
                        cached.unique_name(),
                        remote.version()
                    );
                    self.download_model(&remote).await.0
                }
                Some(_) => {
                    info!("Model [{}] is up to date", cached.unique_name());
                    ResultType::FetchAlreadyExists.into()
                }
                None => {
                    error!("Failed to fetch model details for [{}]", cached.unique_name());
                    details
                }
            };
            results.push((cached, result));
        }
        results
    }

    /// Downloads a newer version of every cached world the server has updated.
    pub async fn update_worlds(&self) -> Vec<(WorldIdentifier, FuelResult)> {
        let mut newest: HashMap<String, WorldIdentifier> = HashMap::new();
        for id in self.cache.all_worlds() {
            let key = id.unique_name();
            if newest.get(&key).is_none_or(|known| known.version() < id.version()) {
                newest.insert(key, id);
            }
        }

        let mut results = Vec::with_capacity(newest.len());
        for (_, cached) in newest {
            let (details, remote) = self.world_details(&cached).await;
            let result = match remote {
                Some(mut remote) if details.is_ok() && cached.version() < remote.version() => {
                    info!(
                        "Updating world [{}] up to version {}",
                        cached.unique_name(),
                        remote.version()
                    );
                    self.download_world(&mut remote).await
                }
                Some(_) => {
                    info!("World [{}] is up to date", cached.unique_name());
                    ResultType::FetchAlreadyExists.into()
                }
                None => {
                    error!("Failed to fetch world details for [{}]", cached.unique_name());
                    details
                }
            };
            results.push((cached, result));
        }
        results
    }

    /// Deletes the model or world named by `url` on its server. The local
    /// cache is left alone.
    pub async fn delete_url(&self, url: &str) -> FuelResult {
        if let Some(id) = self.parse_model_url(url) {
            return self.delete(&id).await;
        }
        if let Some(id) = self.parse_world_url(url) {
            return self.delete(&id).await;
        }
        error!("Unable to parse [{url}] as a model or world url");
        ResultType::DeleteError.into()
    }

    pub async fn delete_model(&self, id: &ModelIdentifier) -> FuelResult {
        self.delete(id).await
    }

    async fn delete<R: Resource + Sync>(&self, id: &R) -> FuelResult {
        let server = id.server();
        let path = format!("{}/{}/{}", id.owner(), R::KIND, id.name());
        let request = RestRequest::new(HttpMethod::Delete, server.url_string(), server.version(), path);
        match self.send(request, server).await {
            Ok(response) if response.is_ok() => ResultType::Delete.into(),
            Ok(response) if response.status == 404 => ResultType::DeleteNotFound.into(),
            Ok(response) => {
                warn!(
                    "Delete of [{}] failed with status {}",
                    id.unique_name(),
                    response.status
                );
                ResultType::DeleteError.into()
            }
            Err(e) => {
                error!("Delete of [{}] failed: {e}", id.unique_name());
                ResultType::DeleteError.into()
            }
        }
    }
}

fn listing_path(owner: &str, kind: &str, name: &str) -> Option<String> {
    match (owner.is_empty(), name.is_empty()) {
        (false, false) => Some(format!("{owner}/{kind}/{name}")),
        (false, true) => Some(format!("{owner}/{kind}")),
        _ => None,
    }
}

fn resource_version(response: &RestResponse) -> u32 {
    let Some(value) = response.header(RESOURCE_VERSION_HEADER) else {
        warn!("Missing {RESOURCE_VERSION_HEADER} in REST response headers. Hardcoding version 1.");
        return 1;
    };
    match value.trim().parse::<u32>() {
        Ok(version) if version != TIP_VERSION => version,
        _ => {
            warn!(
                "Failed to convert {RESOURCE_VERSION_HEADER} header value [{value}] to a version. Hardcoding version 1."
            );
            1
        }
    }
}

fn non_empty(body: Bytes) -> Result<Bytes> {
    if body.is_empty() {
        Err(FuelClientError::Validation("empty archive".into()))
    } else {
        Ok(body)
    }
}

pub(crate) fn fetch_failure(e: &FuelClientError) -> FuelResult {
    match e {
        FuelClientError::ServerError(404, _) => ResultType::FetchNotFound.into(),
        _ => ResultType::FetchError.into(),
    }
}

fn cache_lookup(found: Option<PathBuf>) -> (FuelResult, Option<PathBuf>) {
    match found {
        Some(path) => (ResultType::FetchAlreadyExists.into(), Some(path)),
        None => (ResultType::FetchError.into(), None),
    }
}

/// `file` inside `root`, if it exists. Paths that could leave `root` are refused.
fn file_under(root: &Path, file: &str) -> Option<PathBuf> {
    let relative = Path::new(file);
    let contained = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !contained {
        warn!("Refusing file path [{file}] outside of the resource");
        return None;
    }
    let path = root.join(relative);
    path.exists().then_some(path)
}

fn file_in(result: FuelResult, root: Option<PathBuf>, file: &str) -> (FuelResult, Option<PathBuf>) {
    if !result.is_ok() {
        return (result, None);
    }
    match root.and_then(|root| file_under(&root, file)) {
        Some(path) => (result, Some(path)),
        None => {
            error!("[{file}] is not part of the downloaded resource");
            (ResultType::FetchError.into(), None)
        }
    }
}
