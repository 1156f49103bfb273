use crate::error::ConfigError;

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// The public Fuel server every client knows about.
pub const DEFAULT_SERVER_URL: &str = "https://fuel.gazebosim.org";

/// API version spoken by [`DEFAULT_SERVER_URL`].
pub const DEFAULT_API_VERSION: &str = "1.0";

/// Environment variables overriding the cache location, newest name first.
pub const CACHE_PATH_ENV_VARS: [&str; 2] = ["GZ_FUEL_CACHE_PATH", "IGN_FUEL_CACHE_PATH"];

/// A remote Fuel endpoint.
///
/// A config without a url is "unset": identifiers carrying it match any server
/// in cache queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    url: Option<Url>,
    version: String,
    api_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_SERVER_URL).ok(),
            version: DEFAULT_API_VERSION.to_string(),
            api_key: String::new(),
        }
    }
}

impl ServerConfig {
    /// A server at `url` with no API version or key.
    pub fn new(url: Url) -> Self {
        Self {
            url: Some(url),
            version: String::new(),
            api_key: String::new(),
        }
    }

    pub fn parse(url: &str) -> Option<Self> {
        Url::parse(url).ok().map(Self::new)
    }

    /// A config with neither url nor key.
    pub fn unset() -> Self {
        let mut config = Self::default();
        config.clear();
        config
    }

    pub fn clear(&mut self) {
        self.url = None;
        self.version = DEFAULT_API_VERSION.to_string();
        self.api_key.clear();
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn set_url(&mut self, url: Url) {
        self.url = Some(url);
    }

    /// `scheme://authority`, without the trailing slash `Url` adds.
    pub fn url_string(&self) -> String {
        self.url
            .as_ref()
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .unwrap_or_default()
    }

    /// `host[:port]`, or an empty string for an unset config.
    pub fn authority(&self) -> String {
        self.url.as_ref().map(authority_of).unwrap_or_default()
    }

    /// Whether `url` points at this server (same scheme and authority).
    pub fn is_same_server(&self, url: &Url) -> bool {
        self.url
            .as_ref()
            .is_some_and(|own| own.scheme() == url.scheme() && authority_of(own) == authority_of(url))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.api_key = key.into();
    }

    pub fn as_string(&self, prefix: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{prefix}URL: {}", self.url_string());
        let _ = writeln!(out, "{prefix}Version: {}", self.version);
        let _ = writeln!(out, "{prefix}API Key: {}", self.api_key);
        out
    }
}

pub fn authority_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Client-wide settings: known servers and where the cache lives.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    servers: Vec<ServerConfig>,
    cache_location: PathBuf,
    user_agent: String,
    config_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let mut config = Self {
            servers: vec![ServerConfig::default()],
            cache_location: default_cache_location(),
            user_agent: format!("FuelTools-{}", env!("CARGO_PKG_VERSION")),
            config_path: None,
        };
        if let Some(path) = cache_path_from_env() {
            config.cache_location = path;
        }
        config
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    servers: Vec<ServerEntry>,
    cache: Option<CacheEntry>,
}

#[derive(Deserialize)]
struct ServerEntry {
    url: Option<String>,
    version: Option<String>,
    #[serde(rename = "private-token")]
    private_token: Option<String>,
}

#[derive(Deserialize)]
struct CacheEntry {
    path: Option<String>,
}

impl ClientConfig {
    /// A config that knows no server at all.
    pub fn empty(cache_location: impl Into<PathBuf>) -> Self {
        Self {
            servers: Vec::new(),
            cache_location: cache_location.into(),
            ..Self::default()
        }
    }

    /// Loads `servers` and `cache` from a YAML file.
    ///
    /// Any malformed entry aborts the load and leaves `self` untouched.
    pub fn load_config(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let file = if contents.trim().is_empty() {
            ConfigFile {
                servers: Vec::new(),
                cache: None,
            }
        } else {
            serde_yaml::from_str::<ConfigFile>(&contents)?
        };

        let mut seen = HashSet::new();
        let mut loaded = Vec::with_capacity(file.servers.len());
        for (index, entry) in file.servers.into_iter().enumerate() {
            let raw = entry.url.ok_or(ConfigError::MissingUrl(index))?;
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(ConfigError::EmptyUrl(index));
            }
            let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
            let mut server = ServerConfig::new(url);
            if !seen.insert(server.url_string()) {
                return Err(ConfigError::DuplicateUrl(raw.to_string()));
            }
            server.set_version(entry.version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()));
            if let Some(token) = entry.private_token {
                server.set_api_key(token);
            }
            loaded.push(server);
        }

        let cache_location = match file.cache {
            Some(CacheEntry { path: Some(cache) }) if !cache.trim().is_empty() => {
                Some(PathBuf::from(cache.trim()))
            }
            Some(_) => return Err(ConfigError::MissingCachePath),
            None => None,
        };

        for server in loaded {
            match self
                .servers
                .iter_mut()
                .find(|known| known.url_string() == server.url_string())
            {
                Some(known) => {
                    debug!("Updating configured server [{}]", server.url_string());
                    *known = server;
                }
                None => self.servers.push(server),
            }
        }

        if let Some(cache_location) = cache_location {
            self.cache_location = cache_location;
        }
        if let Some(env_path) = cache_path_from_env() {
            warn!(
                "Cache location overridden by environment: [{}]",
                env_path.display()
            );
            self.cache_location = env_path;
        }
        self.config_path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    pub fn servers_mut(&mut self) -> &mut Vec<ServerConfig> {
        &mut self.servers
    }

    pub fn add_server(&mut self, server: ServerConfig) {
        self.servers.push(server);
    }

    /// The configured server with the same scheme and authority as `url`.
    pub fn server_for(&self, url: &Url) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.is_same_server(url))
    }

    pub fn cache_location(&self) -> &Path {
        &self.cache_location
    }

    pub fn set_cache_location(&mut self, path: impl Into<PathBuf>) {
        self.cache_location = path.into();
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn set_user_agent(&mut self, agent: impl Into<String>) {
        self.user_agent = agent.into();
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn as_string(&self, prefix: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{prefix}Config path: {}",
            self.config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
        let _ = writeln!(out, "{prefix}Cache location: {}", self.cache_location.display());
        let _ = writeln!(out, "{prefix}Servers:");
        for server in &self.servers {
            let _ = writeln!(out, "{prefix}  ---");
            out.push_str(&server.as_string(&format!("{prefix}  ")));
        }
        out
    }
}

pub fn default_cache_location() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gz")
        .join("fuel")
}

pub fn default_config_path() -> PathBuf {
    default_cache_location().join("config.yaml")
}

fn cache_path_from_env() -> Option<PathBuf> {
    cache_path_from(|var| std::env::var(var).ok())
}

/// The first of [`CACHE_PATH_ENV_VARS`] that `lookup` maps to an existing directory.
fn cache_path_from(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    for var in CACHE_PATH_ENV_VARS {
        let Some(value) = lookup(var).filter(|value| !value.is_empty()) else {
            continue;
        };
        let path = PathBuf::from(value);
        if path.is_dir() {
            return Some(path);
        }
        warn!("[{var}] is set to [{}], which is not a directory", path.display());
    }
    None
}
