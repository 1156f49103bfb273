//! Recognizes the five shapes of Fuel resource urls.
//!
//! ```text
//! <scheme>://<authority>/[<api version>/]<owner>/models/<name>[/<version>]
//! <scheme>://<authority>/[<api version>/]<owner>/worlds/<name>[/<version>]
//! <scheme>://<authority>/[<api version>/]<owner>/models/<name>/<version>/files/<path>
//! <scheme>://<authority>/[<api version>/]<owner>/worlds/<name>/<version>/files/<path>
//! <scheme>://<authority>/[<api version>/]<owner>/collections/<name>
//! ```

use fuel_core::prelude::*;
use regex::{Captures, Regex};
use tracing::warn;
use url::Url;

const PREFIX: &str = r"^([[:alnum:].+\-]+)://([^/\s]+)/+([0-9]+[.][0-9]+)?/*([^/\s]+)/+";

/// Parses resource urls into identifiers.
///
/// Servers the parser was built with take precedence over the url: a url
/// naming a configured server gets that server's API version and key.
#[derive(Debug, Clone)]
pub struct UrlParser {
    model: Regex,
    world: Regex,
    model_file: Regex,
    world_file: Regex,
    collection: Regex,
    servers: Vec<ServerConfig>,
}

/// The parts every url shape shares.
struct Parts {
    server: ServerConfig,
    owner: String,
    name: String,
    version: String,
}

impl UrlParser {
    pub fn new(servers: Vec<ServerConfig>) -> Result<Self, regex::Error> {
        let compile = |suffix: &str| Regex::new(&format!("{PREFIX}{suffix}$"));
        Ok(Self {
            model: compile(r"models/+([^/]+)/*([0-9]*|tip)/?")?,
            world: compile(r"worlds/+([^/]+)/*([0-9]*|tip)/?")?,
            // The version segment may be left out before `files`.
            model_file: compile(r"models/+([^/]+)/+(?:([0-9]+|tip)/+)?files/+(.*)")?,
            world_file: compile(r"worlds/+([^/]+)/+(?:([0-9]+|tip)/+)?files/+(.*)")?,
            collection: compile(r"collections/+([^/]+)/*")?,
            servers,
        })
    }

    pub fn parse_model_url(&self, url: &str) -> Option<ModelIdentifier> {
        let parts = self.parts(&self.model, url)?;
        model_from(parts)
    }

    pub fn parse_world_url(&self, url: &str) -> Option<WorldIdentifier> {
        let parts = self.parts(&self.world, url)?;
        world_from(parts)
    }

    /// A model-file url: the model and the file path relative to the model root.
    pub fn parse_model_file_url(&self, url: &str) -> Option<(ModelIdentifier, String)> {
        let (parts, file) = self.file_parts(&self.model_file, url)?;
        Some((model_from(parts)?, file))
    }

    /// A world-file url: the world and the file path relative to the world root.
    pub fn parse_world_file_url(&self, url: &str) -> Option<(WorldIdentifier, String)> {
        let (parts, file) = self.file_parts(&self.world_file, url)?;
        Some((world_from(parts)?, file))
    }

    pub fn parse_collection_url(&self, url: &str) -> Option<CollectionIdentifier> {
        let captures = self.collection.captures(url.trim())?;
        let server = self.server(&captures)?;
        let mut id = CollectionIdentifier::default();
        id.set_server(server);
        id.set_owner(&decoded(&captures, 4)).ok()?;
        id.set_name(&decoded(&captures, 5)).ok()?;
        Some(id)
    }

    fn parts(&self, regex: &Regex, url: &str) -> Option<Parts> {
        let captures = regex.captures(url.trim())?;
        Some(Parts {
            server: self.server(&captures)?,
            owner: decoded(&captures, 4),
            name: decoded(&captures, 5),
            version: group(&captures, 6).to_string(),
        })
    }

    fn file_parts(&self, regex: &Regex, url: &str) -> Option<(Parts, String)> {
        let captures = regex.captures(url.trim())?;
        let file = decoded(&captures, 7).trim_end_matches('/').to_string();
        if file.is_empty() {
            return None;
        }
        let parts = Parts {
            server: self.server(&captures)?,
            owner: decoded(&captures, 4),
            name: decoded(&captures, 5),
            version: group(&captures, 6).to_string(),
        };
        Some((parts, file))
    }

    fn server(&self, captures: &Captures<'_>) -> Option<ServerConfig> {
        let url = Url::parse(&format!("{}://{}", group(captures, 1), group(captures, 2))).ok()?;
        let api_version = group(captures, 3);

        let server = match self.servers.iter().find(|s| s.is_same_server(&url)) {
            Some(configured) => {
                if !api_version.is_empty() && configured.version() != api_version {
                    warn!(
                        "Requested server API version [{api_version}] for server [{}], but will use [{}] as given in the config file.",
                        configured.url_string(),
                        configured.version()
                    );
                }
                configured.clone()
            }
            None => {
                let mut server = ServerConfig::new(url);
                server.set_version(api_version);
                server
            }
        };

        if server.version().is_empty() {
            warn!("Server configuration is incomplete:\n{}", server.as_string("  "));
        }
        Some(server)
    }
}

fn group<'a>(captures: &Captures<'a>, index: usize) -> &'a str {
    captures.get(index).map(|m| m.as_str()).unwrap_or_default()
}

fn decoded(captures: &Captures<'_>, index: usize) -> String {
    let raw = group(captures, index);
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn model_from(parts: Parts) -> Option<ModelIdentifier> {
    let mut id = ModelIdentifier::new(parts.server, &parts.owner, &parts.name).ok()?;
    id.set_version_str(&parts.version).ok()?;
    Some(id)
}

fn world_from(parts: Parts) -> Option<WorldIdentifier> {
    let mut id = WorldIdentifier::new(parts.server, &parts.owner, &parts.name).ok()?;
    id.set_version_str(&parts.version).ok()?;
    Some(id)
}
