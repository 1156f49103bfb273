//! Decoding of the JSON bodies Fuel servers answer with.
//!
//! Absent or `null` fields keep their defaults. A body that cannot be decoded
//! yields no records; errors never leave this module.

use chrono::{DateTime, Utc};
use fuel_core::prelude::*;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::warn;

#[derive(Deserialize, Default)]
#[serde(default)]
struct ModelRecord {
    name: Option<String>,
    owner: Option<String>,
    description: Option<String>,
    filesize: Option<u64>,
    upload_date: Option<String>,
    modify_date: Option<String>,
    likes: Option<u32>,
    downloads: Option<u32>,
    license_name: Option<String>,
    license_url: Option<String>,
    license_image: Option<String>,
    tags: Option<Vec<String>>,
    private: Option<bool>,
    version: Option<u32>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WorldRecord {
    name: Option<String>,
    owner: Option<String>,
    version: Option<u32>,
}

#[derive(Deserialize)]
struct LicenseRecord {
    name: String,
    #[serde(rename = "ID", alias = "id")]
    id: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

fn records<T: DeserializeOwned>(body: &[u8]) -> Vec<T> {
    match serde_json::from_slice::<Option<OneOrMany<T>>>(body) {
        Ok(Some(OneOrMany::Many(records))) => records,
        Ok(Some(OneOrMany::One(record))) => vec![record],
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!("Unable to parse server response: {e}");
            Vec::new()
        }
    }
}

fn parse_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value?)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn model_from(record: ModelRecord, server: &ServerConfig) -> Option<ModelIdentifier> {
    let owner = record.owner.unwrap_or_default();
    let name = record.name.unwrap_or_default();
    let mut id = match ModelIdentifier::new(server.clone(), &owner, &name) {
        Ok(id) => id,
        Err(e) => {
            warn!("Skipping model [{owner}/{name}]: {e}");
            return None;
        }
    };

    id.set_description(record.description.unwrap_or_default());
    id.set_file_size(record.filesize.unwrap_or_default());
    if let Some(date) = parse_date(record.upload_date.as_deref()) {
        id.set_upload_date(date);
    }
    if let Some(date) = parse_date(record.modify_date.as_deref()) {
        id.set_modify_date(date);
    }
    id.set_like_count(record.likes.unwrap_or_default());
    id.set_download_count(record.downloads.unwrap_or_default());
    id.set_license_name(record.license_name.unwrap_or_default());
    id.set_license_url(record.license_url.unwrap_or_default());
    id.set_license_image_url(record.license_image.unwrap_or_default());
    id.set_tags(record.tags.unwrap_or_default());
    id.set_private(record.private.unwrap_or_default());
    id.set_version(record.version.unwrap_or_default());
    Some(id)
}

fn world_from(record: WorldRecord, server: &ServerConfig) -> Option<WorldIdentifier> {
    let owner = record.owner.unwrap_or_default();
    let name = record.name.unwrap_or_default();
    let mut id = match WorldIdentifier::new(server.clone(), &owner, &name) {
        Ok(id) => id,
        Err(e) => {
            warn!("Skipping world [{owner}/{name}]: {e}");
            return None;
        }
    };
    id.set_version(record.version.unwrap_or_default());
    Some(id)
}

/// Models of a listing page (an array) or of a details response (one object).
pub fn parse_models(body: &[u8], server: &ServerConfig) -> Vec<ModelIdentifier> {
    records::<ModelRecord>(body)
        .into_iter()
        .filter_map(|record| model_from(record, server))
        .collect()
}

pub fn parse_model(body: &[u8], server: &ServerConfig) -> Option<ModelIdentifier> {
    parse_models(body, server).into_iter().next()
}

pub fn parse_worlds(body: &[u8], server: &ServerConfig) -> Vec<WorldIdentifier> {
    records::<WorldRecord>(body)
        .into_iter()
        .filter_map(|record| world_from(record, server))
        .collect()
}

pub fn parse_world(body: &[u8], server: &ServerConfig) -> Option<WorldIdentifier> {
    parse_worlds(body, server).into_iter().next()
}

/// License name to server id.
pub fn parse_licenses(body: &[u8]) -> HashMap<String, u32> {
    records::<LicenseRecord>(body)
        .into_iter()
        .map(|license| (license.name, license.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODELS: &str = r#"[
      {
        "name": "Box",
        "owner": "alice",
        "description": "A box",
        "filesize": 1024,
        "upload_date": "2012-04-21T19:25:44.511Z",
        "modify_date": "2012-04-23T18:25:43.511Z",
        "likes": 3,
        "downloads": 12,
        "license_name": "Creative Commons - Public Domain",
        "license_url": "https://creativecommons.org/publicdomain/zero/1.0/",
        "license_image": "https://example.org/cc0.png",
        "tags": ["red", "cube"],
        "private": false,
        "version": 4
      },
      { "name": "Sphere", "owner": "alice", "description": null },
      { "name": "", "owner": "alice" }
    ]"#;

    #[test]
    fn parses_listing_page() {
        let server = ServerConfig::default();
        let models = parse_models(MODELS.as_bytes(), &server);
        assert_eq!(models.len(), 2);

        let first = &models[0];
        assert_eq!(first.name(), "Box");
        assert_eq!(first.file_size(), 1024);
        assert_eq!(first.like_count(), 3);
        assert_eq!(first.download_count(), 12);
        assert_eq!(first.tags(), ["red", "cube"]);
        assert_eq!(first.version(), 4);
        assert_eq!(
            first.upload_date().unwrap().to_rfc3339(),
            "2012-04-21T19:25:44.511+00:00"
        );
        assert_eq!(first.server(), &server);

        assert_eq!(models[1].description(), "");
        assert_eq!(models[1].version(), TIP_VERSION);
    }

    #[test]
    fn details_is_a_single_object() {
        let body = br#"{"name": "Box", "owner": "alice", "version": 2}"#;
        let model = parse_model(body, &ServerConfig::default()).unwrap();
        assert_eq!(model.version(), 2);
    }

    #[test]
    fn null_and_garbage_yield_nothing() {
        let server = ServerConfig::default();
        assert!(parse_models(b"null\n", &server).is_empty());
        assert!(parse_models(b"<html>", &server).is_empty());
        assert!(parse_worlds(b"[]", &server).is_empty());
    }

    #[test]
    fn parses_licenses() {
        let body = br#"[{"ID": 1, "name": "Creative Commons - Public Domain"},
                        {"ID": 2, "name": "Creative Commons - Attribution"}]"#;
        let licenses = parse_licenses(body);
        assert_eq!(licenses.get("Creative Commons - Attribution"), Some(&2));
        assert_eq!(licenses.len(), 2);
    }
}
