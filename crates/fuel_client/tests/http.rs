//! The client against a real HTTP server on localhost.

mod common;

use axum::Router;
use axum::extract::{Multipart, Path, Query};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use common::model_zip;
use fuel_client::FuelClient;
use fuel_core::prelude::*;
use std::collections::HashMap;
use tempfile::TempDir;

async fn download(
    Path((owner, name, version, _file)): Path<(String, String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if owner != "alice" || name != "Empty Box" || query.get("link").map(String::as_str) != Some("true") {
        return (StatusCode::NOT_FOUND, HeaderMap::new(), Vec::new());
    }
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "application/zip".parse().unwrap());
    let served = if version == "tip" { "4".to_string() } else { version };
    headers.insert("X-Ign-Resource-Version", served.parse().unwrap());
    (StatusCode::OK, headers, model_zip(&name, &[]))
}

async fn details(Path((owner, name)): Path<(String, String)>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": name,
        "owner": owner,
        "version": 4,
        "tags": ["boxes"],
        "likes": 9,
    }))
}

async fn listing(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    match query.get("page").map(String::as_str) {
        Some("1") => r#"[{"name":"a","owner":"alice"},{"name":"b","owner":"alice"}]"#,
        Some("2") => r#"[{"name":"c","owner":"bob"}]"#,
        _ => "null",
    }
}

async fn upload(headers: HeaderMap, mut multipart: Multipart) -> StatusCode {
    if headers.get("private-token").and_then(|v| v.to_str().ok()) != Some("secret") {
        return StatusCode::UNAUTHORIZED;
    }
    let mut files = Vec::new();
    let mut name = String::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name() {
            Some("file") => files.push(field.file_name().unwrap_or_default().to_string()),
            Some("name") => name = field.text().await.unwrap_or_default(),
            _ => {}
        }
    }
    files.sort();
    if name == "Upload Me" && files == ["meshes/part.dae", "metadata.pbtxt"] {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    }
}

async fn remove(Path(name): Path<String>) -> StatusCode {
    if name == "Old" {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn start() -> ServerConfig {
    let app = Router::new()
        .route("/1.0/models", get(listing).post(upload))
        .route("/1.0/{owner}/models/{name}", get(details))
        .route("/1.0/{owner}/models/{name}/{version}/{file}", get(download))
        .route("/1.0/alice/worlds/{name}", delete(remove));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut server = ServerConfig::parse(&format!("http://{address}")).unwrap();
    server.set_version("1.0");
    server
}

fn client(server: &ServerConfig) -> (FuelClient, TempDir) {
    let cache = TempDir::new().unwrap();
    let mut config = ClientConfig::empty(cache.path());
    config.add_server(server.clone());
    (FuelClient::new(config).unwrap(), cache)
}

#[tokio::test]
async fn downloads_over_http() {
    let server = start().await;
    let (client, cache) = client(&server);

    let url = format!("{}/1.0/alice/models/Empty%20Box", server.url_string());
    let (result, path) = client.download_model_url(&url).await;
    assert_eq!(result.result_type(), ResultType::Fetch);

    let path = path.unwrap();
    assert!(path.starts_with(cache.path()));
    assert!(path.ends_with("alice/models/Empty Box/4"));
    assert!(path.join("meshes/body.dae").is_file());

    let (result, cached) = client.cached_model(&url);
    assert_eq!(result.result_type(), ResultType::FetchAlreadyExists);
    assert_eq!(cached.unwrap(), path);
}

#[tokio::test]
async fn details_and_listing_over_http() {
    let server = start().await;
    let (client, _cache) = client(&server);

    let id = ModelIdentifier::new(server.clone(), "alice", "Empty Box").unwrap();
    let (result, details) = client.model_details(&id).await;
    assert!(result.is_ok());
    let details = details.unwrap();
    assert_eq!(details.version(), 4);
    assert_eq!(details.like_count(), 9);
    assert_eq!(details.tags(), ["boxes"]);

    let names: Vec<String> = client
        .models(&server)
        .await
        .collect_vec()
        .await
        .iter()
        .map(|model| model.identification().unique_name())
        .collect();
    let authority = server.authority();
    assert_eq!(
        names,
        [
            format!("{authority}/alice/models/a"),
            format!("{authority}/alice/models/b"),
            format!("{authority}/bob/models/c"),
        ]
    );
}

#[tokio::test]
async fn uploads_and_deletes_over_http() {
    let mut server = start().await;
    server.set_api_key("secret");
    let (client, _cache) = client(&server);

    let dir = TempDir::new().unwrap();
    let meta = FuelMetadata {
        name: "Upload Me".into(),
        ..Default::default()
    };
    std::fs::write(dir.path().join(METADATA_PBTXT), meta.to_pbtxt()).unwrap();
    std::fs::create_dir_all(dir.path().join("meshes")).unwrap();
    std::fs::write(dir.path().join("meshes/part.dae"), "<COLLADA/>").unwrap();

    let id = ModelIdentifier::new(server.clone(), "alice", "Upload Me").unwrap();
    let result = client.upload_model(dir.path(), &id, false, None).await;
    assert_eq!(result.result_type(), ResultType::Upload);

    let world = format!("{}/1.0/alice/worlds/Old", server.url_string());
    assert_eq!(client.delete_url(&world).await.result_type(), ResultType::Delete);
    let missing = format!("{}/1.0/alice/worlds/Nothing", server.url_string());
    assert_eq!(
        client.delete_url(&missing).await.result_type(),
        ResultType::DeleteNotFound
    );
}
