#![allow(dead_code)]

use async_trait::async_trait;
use fuel_cache::archive;
use fuel_client::FuelClient;
use fuel_core::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SERVER: &str = "https://fuel.test";

pub fn server() -> ServerConfig {
    let mut server = ServerConfig::parse(SERVER).unwrap();
    server.set_version("1.0");
    server
}

pub fn model_id(owner: &str, name: &str) -> ModelIdentifier {
    ModelIdentifier::new(server(), owner, name).unwrap()
}

pub fn world_id(owner: &str, name: &str) -> WorldIdentifier {
    WorldIdentifier::new(server(), owner, name).unwrap()
}

pub fn model_url(owner: &str, name: &str) -> String {
    format!("{SERVER}/1.0/{owner}/models/{name}")
}

/// Answers from a table keyed by `"<METHOD> <path>"` and records every request.
/// Unknown routes answer 404.
#[derive(Default)]
pub struct FakeServer {
    routes: Mutex<HashMap<String, RestResponse>>,
    calls: Mutex<Vec<RestRequest>>,
    panics: Mutex<HashSet<String>>,
}

impl FakeServer {
    pub fn route(&self, method: HttpMethod, path: &str, response: RestResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{method:?} {path}"), response);
    }

    /// Makes the request for `path` panic inside the transport.
    pub fn panic_on(&self, method: HttpMethod, path: &str) {
        self.panics.lock().unwrap().insert(format!("{method:?} {path}"));
    }

    pub fn calls(&self) -> Vec<RestRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    /// Serves `owner/models/name` at `version` as a zip archive.
    pub fn serve_model(&self, owner: &str, name: &str, version: u32, dependencies: &[String]) {
        let response = RestResponse::new(200, model_zip(name, dependencies))
            .with_header("Content-Type", "application/zip")
            .with_header("X-Ign-Resource-Version", version.to_string());
        self.route(
            HttpMethod::Get,
            &format!("{owner}/models/{name}/tip/{name}.zip"),
            response.clone(),
        );
        self.route(
            HttpMethod::Get,
            &format!("{owner}/models/{name}/{version}/{name}.zip"),
            response,
        );
        self.route(
            HttpMethod::Get,
            &format!("{owner}/models/{name}"),
            RestResponse::new(
                200,
                format!(r#"{{"name":"{name}","owner":"{owner}","version":{version}}}"#),
            ),
        );
    }

    /// Serves `owner/worlds/name` at `version` as a zip archive.
    pub fn serve_world(&self, owner: &str, name: &str, version: u32) {
        let response = RestResponse::new(200, world_zip(name))
            .with_header("Content-Type", "application/zip")
            .with_header("X-Ign-Resource-Version", version.to_string());
        self.route(
            HttpMethod::Get,
            &format!("{owner}/worlds/{name}/tip/{name}.zip"),
            response.clone(),
        );
        self.route(
            HttpMethod::Get,
            &format!("{owner}/worlds/{name}/{version}/{name}.zip"),
            response,
        );
        self.route(
            HttpMethod::Get,
            &format!("{owner}/worlds/{name}"),
            RestResponse::new(
                200,
                format!(r#"{{"name":"{name}","owner":"{owner}","version":{version}}}"#),
            ),
        );
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn request(&self, request: RestRequest) -> Result<RestResponse, TransportError> {
        let key = format!("{:?} {}", request.method, request.path);
        self.calls.lock().unwrap().push(request);
        if self.panics.lock().unwrap().contains(&key) {
            panic!("transport failure on {key}");
        }
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| RestResponse::new(404, "not found")))
    }
}

/// A zipped model directory whose manifest lists `dependencies`.
pub fn model_zip(name: &str, dependencies: &[String]) -> Vec<u8> {
    let dir = TempDir::new().unwrap();
    let meta = FuelMetadata {
        name: name.to_string(),
        description: format!("The {name} model"),
        dependencies: dependencies.to_vec(),
        model_file: Some("model.sdf".into()),
        ..Default::default()
    };
    std::fs::write(dir.path().join(METADATA_PBTXT), meta.to_pbtxt()).unwrap();
    std::fs::write(dir.path().join("model.sdf"), "<sdf version='1.9'/>").unwrap();
    std::fs::create_dir_all(dir.path().join("meshes")).unwrap();
    std::fs::write(dir.path().join("meshes/body.dae"), "<COLLADA/>").unwrap();
    archive::compress_to_vec(dir.path()).unwrap()
}

/// A zipped world directory with one world file.
pub fn world_zip(name: &str) -> Vec<u8> {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(format!("{name}.sdf")), "<sdf version='1.9'/>").unwrap();
    archive::compress_to_vec(dir.path()).unwrap()
}

/// A client over `fake` with its cache in a fresh directory.
pub fn client(fake: &Arc<FakeServer>) -> (FuelClient, TempDir) {
    let cache = TempDir::new().unwrap();
    let mut config = ClientConfig::empty(cache.path());
    config.add_server(server());
    let client = FuelClient::with_transport(config, fake.clone()).unwrap();
    (client, cache)
}
