//! Identifiers of the resources a Fuel server hosts.
//!
//! Owners and names are stored exactly as given. Setters reject values that
//! could not be used as a single path segment of the local cache and keep the
//! previous value in that case.

use crate::config::ServerConfig;
use crate::error::IdentifierError;

use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Version number that stands for "the latest version".
pub const TIP_VERSION: u32 = 0;

/// Behaviour shared by every identifier kind.
pub trait Resource {
    /// Path segment naming the kind on the server and in the cache.
    const KIND: &'static str;

    fn owner(&self) -> &str;
    fn name(&self) -> &str;
    fn server(&self) -> &ServerConfig;

    /// `<host[:port]>/<owner>/<kind>/<name>`, recomputed on every call.
    fn unique_name(&self) -> String {
        unique_name(self.server(), self.owner(), Self::KIND, self.name())
    }
}

fn unique_name(server: &ServerConfig, owner: &str, kind: &str, name: &str) -> String {
    let authority = server.authority();
    if authority.is_empty() {
        format!("{owner}/{kind}/{name}")
    } else {
        format!("{authority}/{owner}/{kind}/{name}")
    }
}

/// Checks that `value` can be used as an owner or a name.
pub fn validate_segment(field: &'static str, value: &str) -> Result<(), IdentifierError> {
    let invalid = |reason| IdentifierError::Invalid {
        field,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(IdentifierError::Empty { field });
    }
    if value == "." || value == ".." {
        return Err(invalid("relative path segment"));
    }
    if value.contains(['/', '\\']) {
        return Err(invalid("contains a path separator"));
    }
    if value.chars().any(char::is_control) {
        return Err(invalid("contains a control character"));
    }
    Ok(())
}

fn set_segment(
    slot: &mut String,
    field: &'static str,
    value: &str,
) -> Result<(), IdentifierError> {
    validate_segment(field, value)?;
    *slot = value.to_string();
    Ok(())
}

/// Parses `"tip"`, `""` or a decimal number into a version.
pub fn parse_version(value: &str) -> Result<u32, IdentifierError> {
    match value {
        "" | "tip" => Ok(TIP_VERSION),
        digits => digits
            .parse::<u32>()
            .map_err(|_| IdentifierError::Version(digits.to_string())),
    }
}

pub fn version_to_string(version: u32) -> String {
    if version == TIP_VERSION {
        "tip".to_string()
    } else {
        version.to_string()
    }
}

/// A model hosted on a Fuel server, along with the metadata the server reports.
#[derive(Debug, Clone, Default)]
pub struct ModelIdentifier {
    name: String,
    owner: String,
    server: ServerConfig,
    version: u32,
    description: String,
    file_size: u64,
    upload_date: Option<DateTime<Utc>>,
    modify_date: Option<DateTime<Utc>>,
    like_count: u32,
    download_count: u32,
    license_name: String,
    license_url: String,
    license_image_url: String,
    tags: Vec<String>,
    private: bool,
}

impl ModelIdentifier {
    pub fn new(server: ServerConfig, owner: &str, name: &str) -> Result<Self, IdentifierError> {
        let mut id = Self {
            server,
            ..Self::default()
        };
        id.set_owner(owner)?;
        id.set_name(name)?;
        Ok(id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), IdentifierError> {
        set_segment(&mut self.name, "name", name)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn set_owner(&mut self, owner: &str) -> Result<(), IdentifierError> {
        set_segment(&mut self.owner, "owner", owner)
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut ServerConfig {
        &mut self.server
    }

    pub fn set_server(&mut self, server: ServerConfig) {
        self.server = server;
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn version_str(&self) -> String {
        version_to_string(self.version)
    }

    pub fn set_version_str(&mut self, version: &str) -> Result<(), IdentifierError> {
        self.version = parse_version(version)?;
        Ok(())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn set_file_size(&mut self, size: u64) {
        self.file_size = size;
    }

    pub fn upload_date(&self) -> Option<DateTime<Utc>> {
        self.upload_date
    }

    pub fn set_upload_date(&mut self, date: DateTime<Utc>) {
        self.upload_date = Some(date);
    }

    pub fn modify_date(&self) -> Option<DateTime<Utc>> {
        self.modify_date
    }

    pub fn set_modify_date(&mut self, date: DateTime<Utc>) {
        self.modify_date = Some(date);
    }

    pub fn like_count(&self) -> u32 {
        self.like_count
    }

    pub fn set_like_count(&mut self, likes: u32) {
        self.like_count = likes;
    }

    pub fn download_count(&self) -> u32 {
        self.download_count
    }

    pub fn set_download_count(&mut self, downloads: u32) {
        self.download_count = downloads;
    }

    pub fn license_name(&self) -> &str {
        &self.license_name
    }

    pub fn set_license_name(&mut self, name: impl Into<String>) {
        self.license_name = name.into();
    }

    pub fn license_url(&self) -> &str {
        &self.license_url
    }

    pub fn set_license_url(&mut self, url: impl Into<String>) {
        self.license_url = url.into();
    }

    pub fn license_image_url(&self) -> &str {
        &self.license_image_url
    }

    pub fn set_license_image_url(&mut self, url: impl Into<String>) {
        self.license_image_url = url.into();
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = tags;
    }

    pub fn private(&self) -> bool {
        self.private
    }

    pub fn set_private(&mut self, private: bool) {
        self.private = private;
    }

    pub fn unique_name(&self) -> String {
        Resource::unique_name(self)
    }

    pub fn as_string(&self, prefix: &str) -> String {
        let date = |d: Option<DateTime<Utc>>| d.map(|d| d.to_rfc3339()).unwrap_or_default();
        let mut out = String::new();
        let _ = writeln!(out, "{prefix}Name: {}", self.name);
        let _ = writeln!(out, "{prefix}Owner: {}", self.owner);
        let _ = writeln!(out, "{prefix}Version: {}", self.version_str());
        let _ = writeln!(out, "{prefix}Unique name: {}", self.unique_name());
        let _ = writeln!(out, "{prefix}Description: {}", self.description);
        let _ = writeln!(out, "{prefix}File size: {}", self.file_size);
        let _ = writeln!(out, "{prefix}Upload date: {}", date(self.upload_date));
        let _ = writeln!(out, "{prefix}Modify date: {}", date(self.modify_date));
        let _ = writeln!(out, "{prefix}Likes: {}", self.like_count);
        let _ = writeln!(out, "{prefix}Downloads: {}", self.download_count);
        let _ = writeln!(out, "{prefix}License name: {}", self.license_name);
        let _ = writeln!(out, "{prefix}License URL: {}", self.license_url);
        let _ = writeln!(out, "{prefix}License image URL: {}", self.license_image_url);
        let _ = writeln!(out, "{prefix}Tags: {}", self.tags.join(", "));
        let _ = writeln!(out, "{prefix}Private: {}", self.private);
        let _ = writeln!(out, "{prefix}Server:");
        out.push_str(&self.server.as_string(&format!("{prefix}  ")));
        out
    }
}

impl Resource for ModelIdentifier {
    const KIND: &'static str = "models";

    fn owner(&self) -> &str {
        &self.owner
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn server(&self) -> &ServerConfig {
        &self.server
    }
}

impl PartialEq for ModelIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.unique_name() == other.unique_name()
    }
}

impl Eq for ModelIdentifier {}

impl Hash for ModelIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique_name().hash(state);
    }
}

/// A world hosted on a Fuel server.
#[derive(Debug, Clone, Default)]
pub struct WorldIdentifier {
    name: String,
    owner: String,
    server: ServerConfig,
    version: u32,
    local_path: Option<PathBuf>,
}

impl WorldIdentifier {
    pub fn new(server: ServerConfig, owner: &str, name: &str) -> Result<Self, IdentifierError> {
        let mut id = Self {
            server,
            ..Self::default()
        };
        id.set_owner(owner)?;
        id.set_name(name)?;
        Ok(id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), IdentifierError> {
        set_segment(&mut self.name, "name", name)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn set_owner(&mut self, owner: &str) -> Result<(), IdentifierError> {
        set_segment(&mut self.owner, "owner", owner)
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut ServerConfig {
        &mut self.server
    }

    pub fn set_server(&mut self, server: ServerConfig) {
        self.server = server;
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn version_str(&self) -> String {
        version_to_string(self.version)
    }

    pub fn set_version_str(&mut self, version: &str) -> Result<(), IdentifierError> {
        self.version = parse_version(version)?;
        Ok(())
    }

    /// Where the world lives in the local cache, once downloaded or found there.
    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    pub fn set_local_path(&mut self, path: impl Into<PathBuf>) {
        self.local_path = Some(path.into());
    }

    pub fn unique_name(&self) -> String {
        Resource::unique_name(self)
    }

    pub fn as_string(&self, prefix: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{prefix}Name: {}", self.name);
        let _ = writeln!(out, "{prefix}Owner: {}", self.owner);
        let _ = writeln!(out, "{prefix}Version: {}", self.version_str());
        let _ = writeln!(out, "{prefix}Unique name: {}", self.unique_name());
        let _ = writeln!(
            out,
            "{prefix}Local path: {}",
            self.local_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
        let _ = writeln!(out, "{prefix}Server:");
        out.push_str(&self.server.as_string(&format!("{prefix}  ")));
        out
    }
}

impl Resource for WorldIdentifier {
    const KIND: &'static str = "worlds";

    fn owner(&self) -> &str {
        &self.owner
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn server(&self) -> &ServerConfig {
        &self.server
    }
}

impl PartialEq for WorldIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.unique_name() == other.unique_name()
    }
}

impl Eq for WorldIdentifier {}

impl Hash for WorldIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique_name().hash(state);
    }
}

/// A named collection of models and worlds. Collections are not versioned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionIdentifier {
    name: String,
    owner: String,
    server: ServerConfig,
}

impl CollectionIdentifier {
    pub fn new(server: ServerConfig, owner: &str, name: &str) -> Result<Self, IdentifierError> {
        let mut id = Self {
            server,
            ..Self::default()
        };
        id.set_owner(owner)?;
        id.set_name(name)?;
        Ok(id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), IdentifierError> {
        set_segment(&mut self.name, "name", name)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn set_owner(&mut self, owner: &str) -> Result<(), IdentifierError> {
        set_segment(&mut self.owner, "owner", owner)
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn set_server(&mut self, server: ServerConfig) {
        self.server = server;
    }

    pub fn unique_name(&self) -> String {
        Resource::unique_name(self)
    }
}

impl Resource for CollectionIdentifier {
    const KIND: &'static str = "collections";

    fn owner(&self) -> &str {
        &self.owner
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn server(&self) -> &ServerConfig {
        &self.server
    }
}

/// A model together with its location in the local cache, when it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    identification: ModelIdentifier,
    path: Option<PathBuf>,
}

impl Model {
    pub fn new(identification: ModelIdentifier, path: Option<PathBuf>) -> Self {
        Self {
            identification,
            path,
        }
    }

    pub fn identification(&self) -> &ModelIdentifier {
        &self.identification
    }

    pub fn path_to_model(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn into_identification(self) -> ModelIdentifier {
        self.identification
    }
}

impl From<ModelIdentifier> for Model {
    fn from(identification: ModelIdentifier) -> Self {
        Self::new(identification, None)
    }
}
