//! # Fuel Local Cache
//!
//! The on-disk source of truth for "do I already have this resource".
//!
//! Resources live under
//! `<root>/<host[:port]>/<owner>/<models|worlds>/<name>/<version>/`. A version
//! directory only counts once it holds a manifest: `metadata.pbtxt` or
//! `model.config` for models, a `.sdf`/`.world` file (or `metadata.pbtxt`) for
//! worlds.
//!
//! ## Features
//!
//! * **Atomic Saves**: archives are unpacked into a staging directory that is
//!   renamed into place, so a version directory is never seen half written.
//!
//! ## Usage
//!
//! ```no_run
//! use fuel_cache::LocalCache;
//! use fuel_core::config::ClientConfig;
//!
//! let cache = LocalCache::new(&ClientConfig::default());
//! for model in cache.all_models() {
//!     println!("{}", model.identification().unique_name());
//! }
//! ```

pub mod archive;
pub mod error;

pub use error::CacheError;

use fuel_core::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
    servers: Vec<ServerConfig>,
}

impl LocalCache {
    /// A cache rooted at the config's cache location that knows its servers.
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_root(config.cache_location(), config.servers().to_vec())
    }

    pub fn with_root(root: impl Into<PathBuf>, servers: Vec<ServerConfig>) -> Self {
        Self {
            root: root.into(),
            servers,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<host[:port]>/<owner>/<kind>/<name>`.
    pub fn resource_dir<R: Resource>(&self, id: &R) -> PathBuf {
        self.root
            .join(id.server().authority())
            .join(id.owner())
            .join(R::KIND)
            .join(id.name())
    }

    /// Every valid cached model, across all servers.
    pub fn all_models(&self) -> CachedModels {
        CachedModels {
            walker: self.walker(ModelIdentifier::KIND),
        }
    }

    /// Every valid cached world, across all servers.
    pub fn all_worlds(&self) -> CachedWorlds {
        CachedWorlds {
            walker: self.walker(WorldIdentifier::KIND),
        }
    }

    /// Cached models agreeing with every field set on `id`.
    ///
    /// An unset server, an empty owner or an empty name match anything.
    pub fn matching_models(&self, id: &ModelIdentifier) -> impl Iterator<Item = Model> + use<> {
        let filter = Filter::new(id);
        self.all_models()
            .filter(move |model| filter.accepts(model.identification()))
    }

    pub fn matching_worlds(
        &self,
        id: &WorldIdentifier,
    ) -> impl Iterator<Item = WorldIdentifier> + use<> {
        let filter = Filter::new(id);
        self.all_worlds().filter(move |world| filter.accepts(world))
    }

    /// Exact lookup of one model. A tip version resolves to the newest cached one.
    pub fn matching_model(&self, id: &ModelIdentifier) -> Option<Model> {
        let (version, path) = self.locate(id, id.version())?;
        let mut found = id.clone();
        found.set_version(version);
        Some(Model::new(found, Some(path)))
    }

    /// Exact lookup of one world, returned with its version and local path filled in.
    pub fn matching_world(&self, id: &WorldIdentifier) -> Option<WorldIdentifier> {
        let (version, path) = self.locate(id, id.version())?;
        let mut found = id.clone();
        found.set_version(version);
        found.set_local_path(path);
        Some(found)
    }

    /// Unpacks a downloaded model archive into the cache.
    ///
    /// A tip version becomes one past the newest version already cached. On
    /// success `id` carries the concrete version and the version directory is
    /// returned.
    #[instrument(skip(self, id, data), fields(model = %id.unique_name()))]
    pub async fn save_model(
        &self,
        id: &mut ModelIdentifier,
        data: impl Into<Vec<u8>>,
        overwrite: bool,
    ) -> Result<PathBuf, CacheError> {
        let (version, path) = self.save(&*id, id.version(), data.into(), overwrite).await?;
        id.set_version(version);
        info!("Saved model version {version} at [{}]", path.display());
        Ok(path)
    }

    /// Same as [`LocalCache::save_model`], also recording the local path on `id`.
    #[instrument(skip(self, id, data), fields(world = %id.unique_name()))]
    pub async fn save_world(
        &self,
        id: &mut WorldIdentifier,
        data: impl Into<Vec<u8>>,
        overwrite: bool,
    ) -> Result<PathBuf, CacheError> {
        let (version, path) = self.save(&*id, id.version(), data.into(), overwrite).await?;
        id.set_version(version);
        id.set_local_path(&path);
        info!("Saved world version {version} at [{}]", path.display());
        Ok(path)
    }

    async fn save<R: Resource>(
        &self,
        id: &R,
        version: u32,
        data: Vec<u8>,
        overwrite: bool,
    ) -> Result<(u32, PathBuf), CacheError> {
        if id.server().url().is_none() || id.owner().is_empty() || id.name().is_empty() {
            return Err(CacheError::IncompleteIdentifier(id.unique_name()));
        }
        let dir = self.resource_dir(id);
        let kind = R::KIND;
        tokio::task::spawn_blocking(move || store(kind, &dir, version, &data, overwrite)).await?
    }

    fn locate<R: Resource>(&self, id: &R, version: u32) -> Option<(u32, PathBuf)> {
        if id.server().url().is_none() || id.owner().is_empty() || id.name().is_empty() {
            return None;
        }
        let dir = self.resource_dir(id);
        if version != TIP_VERSION {
            let path = dir.join(version.to_string());
            return has_manifest(R::KIND, &path).then_some((version, path));
        }
        version_dirs(&dir)
            .filter(|(_, path)| has_manifest(R::KIND, path))
            .max_by_key(|(version, _)| *version)
    }

    fn walker(&self, kind: &'static str) -> CacheWalker {
        CacheWalker {
            root: self.root.clone(),
            kind,
            servers: self.servers.clone(),
            entries: walkdir::WalkDir::new(&self.root)
                .min_depth(5)
                .max_depth(5)
                .sort_by_file_name()
                .into_iter(),
        }
    }
}

fn store(
    kind: &str,
    dir: &Path,
    version: u32,
    data: &[u8],
    overwrite: bool,
) -> Result<(u32, PathBuf), CacheError> {
    let version = match version {
        TIP_VERSION => version_dirs(dir).map(|(v, _)| v).max().unwrap_or(0) + 1,
        version => version,
    };
    let dest = dir.join(version.to_string());
    if dest.exists() && !overwrite {
        return Err(CacheError::AlreadyExists(dest));
    }

    let staging = dir.join(format!(".{version}.tmp"));
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }
    std::fs::create_dir_all(&staging)?;

    let unpacked = archive::extract(data, &staging).and_then(|()| {
        if has_manifest(kind, &staging) {
            Ok(())
        } else {
            Err(CacheError::MissingManifest(dest.clone()))
        }
    });
    if let Err(e) = unpacked {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    if dest.exists() {
        debug!("Replacing [{}]", dest.display());
        std::fs::remove_dir_all(&dest)?;
    }
    std::fs::rename(&staging, &dest)?;
    Ok((version, dest))
}

/// Numeric child directories of a resource directory.
fn version_dirs(dir: &Path) -> impl Iterator<Item = (u32, PathBuf)> + use<> {
    std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| {
            let version = entry.file_name().to_str()?.parse::<u32>().ok()?;
            (version != TIP_VERSION).then(|| (version, entry.path()))
        })
}

/// Whether `dir` holds the manifest that makes it a cached resource of `kind`.
pub fn has_manifest(kind: &str, dir: &Path) -> bool {
    if kind == WorldIdentifier::KIND {
        dir.join(METADATA_PBTXT).is_file() || first_file_with(dir, &["sdf", "world"]).is_some()
    } else {
        FuelMetadata::manifest_path(dir).is_some()
    }
}

fn first_file_with(dir: &Path, extensions: &[&str]) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.contains(&ext))
        })
        .collect();
    files.sort();
    files.into_iter().next()
}

/// The main SDF file of an unpacked model or world directory.
///
/// The manifest's file entry wins; without a manifest the first `.sdf` file
/// is used.
pub fn sdf_from_path(path: impl AsRef<Path>) -> Option<PathBuf> {
    let path = path.as_ref();
    if FuelMetadata::manifest_path(path).is_some() {
        let meta = FuelMetadata::load_from_dir(path).ok()?;
        return meta.main_file().map(|file| path.join(file));
    }
    first_file_with(path, &["sdf"])
}

struct Filter {
    authority: Option<String>,
    owner: String,
    name: String,
}

impl Filter {
    fn new<R: Resource>(id: &R) -> Self {
        Self {
            authority: id.server().url().map(|_| id.server().authority()),
            owner: id.owner().to_string(),
            name: id.name().to_string(),
        }
    }

    fn accepts<R: Resource>(&self, candidate: &R) -> bool {
        self.authority
            .as_ref()
            .is_none_or(|authority| *authority == candidate.server().authority())
            && (self.owner.is_empty() || self.owner == candidate.owner())
            && (self.name.is_empty() || self.name == candidate.name())
    }
}

struct CachedEntry {
    server: ServerConfig,
    owner: String,
    name: String,
    version: u32,
    path: PathBuf,
}

struct CacheWalker {
    root: PathBuf,
    kind: &'static str,
    servers: Vec<ServerConfig>,
    entries: walkdir::IntoIter,
}

impl CacheWalker {
    fn entry(&self, path: &Path) -> Option<CachedEntry> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        let [server_dir, owner, kind, name, version] = parts.as_slice() else {
            return None;
        };
        if *kind != self.kind {
            return None;
        }
        let version = version.parse::<u32>().ok().filter(|v| *v != TIP_VERSION)?;
        if !has_manifest(self.kind, path) {
            return None;
        }

        let server = match self.servers.iter().find(|s| s.authority() == *server_dir) {
            Some(server) => server.clone(),
            None => ServerConfig::parse(&format!("https://{server_dir}"))?,
        };
        Some(CachedEntry {
            server,
            owner: owner.to_string(),
            name: name.to_string(),
            version,
            path: path.to_path_buf(),
        })
    }
}

impl Iterator for CacheWalker {
    type Item = CachedEntry;

    fn next(&mut self) -> Option<CachedEntry> {
        while let Some(entry) = self.entries.next() {
            let Ok(entry) = entry else {
                continue;
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if let Some(found) = self.entry(entry.path()) {
                return Some(found);
            }
        }
        None
    }
}

/// Lazy walk over the cached models. Recreate it to start over.
pub struct CachedModels {
    walker: CacheWalker,
}

impl Iterator for CachedModels {
    type Item = Model;

    fn next(&mut self) -> Option<Model> {
        for entry in self.walker.by_ref() {
            let Ok(mut id) = ModelIdentifier::new(entry.server, &entry.owner, &entry.name) else {
                continue;
            };
            id.set_version(entry.version);
            return Some(Model::new(id, Some(entry.path)));
        }
        None
    }
}

/// Lazy walk over the cached worlds. Recreate it to start over.
pub struct CachedWorlds {
    walker: CacheWalker,
}

impl Iterator for CachedWorlds {
    type Item = WorldIdentifier;

    fn next(&mut self) -> Option<WorldIdentifier> {
        for entry in self.walker.by_ref() {
            let Ok(mut id) = WorldIdentifier::new(entry.server, &entry.owner, &entry.name) else {
                continue;
            };
            id.set_version(entry.version);
            id.set_local_path(entry.path);
            return Some(id);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn server(url: &str) -> ServerConfig {
        let mut server = ServerConfig::parse(url).unwrap();
        server.set_version("1.0");
        server
    }

    fn place(root: &Path, relative: &str, manifest: Option<&str>) {
        let dir = root.join(relative);
        fs::create_dir_all(&dir).unwrap();
        if let Some(file) = manifest {
            fs::write(dir.join(file), "<model><name>x</name></model>").unwrap();
        }
    }

    fn model_zip(marker: &str) -> Vec<u8> {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join(MODEL_CONFIG), "<model><name>Box</name></model>").unwrap();
        fs::write(src.path().join("marker.txt"), marker).unwrap();
        archive::compress_to_vec(src.path()).unwrap()
    }

    fn fixture() -> (TempDir, LocalCache) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        place(root, "fuel.example.org/alice/models/Box/1", Some(MODEL_CONFIG));
        place(root, "fuel.example.org/alice/models/Box/2", Some(METADATA_PBTXT));
        place(root, "fuel.example.org/alice/models/Sphere/1", Some(MODEL_CONFIG));
        place(root, "fuel.example.org/bob/models/Cone/3", Some(MODEL_CONFIG));
        place(root, "localhost:8001/bob/models/Cone/1", Some(MODEL_CONFIG));
        place(root, "localhost:8001/carol/models/Empty Box/1", Some(MODEL_CONFIG));
        // Not counted: no manifest, non-numeric version, wrong kind.
        place(root, "fuel.example.org/alice/models/Broken/1", None);
        place(root, "fuel.example.org/alice/models/Box/.3.tmp", Some(MODEL_CONFIG));
        place(root, "fuel.example.org/alice/worlds/Empty/1", Some("empty.world"));

        let cache = LocalCache::with_root(
            root,
            vec![server("https://fuel.example.org"), server("http://localhost:8001")],
        );
        (dir, cache)
    }

    #[test]
    fn enumerates_every_valid_model() {
        let (_dir, cache) = fixture();
        let names: HashSet<(String, u32)> = cache
            .all_models()
            .map(|m| (m.identification().unique_name(), m.identification().version()))
            .collect();

        let expected: HashSet<(String, u32)> = [
            ("fuel.example.org/alice/models/Box", 1),
            ("fuel.example.org/alice/models/Box", 2),
            ("fuel.example.org/alice/models/Sphere", 1),
            ("fuel.example.org/bob/models/Cone", 3),
            ("localhost:8001/bob/models/Cone", 1),
            ("localhost:8001/carol/models/Empty Box", 1),
        ]
        .into_iter()
        .map(|(name, version)| (name.to_string(), version))
        .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn enumerated_models_use_configured_servers() {
        let (_dir, cache) = fixture();
        let local = cache
            .all_models()
            .find(|m| m.identification().owner() == "carol")
            .unwrap();
        assert_eq!(local.identification().server().url_string(), "http://localhost:8001");
        assert_eq!(local.identification().server().version(), "1.0");
        assert!(local.path_to_model().unwrap().ends_with("Empty Box/1"));
    }

    #[test]
    fn unknown_server_directories_are_enumerated() {
        let dir = TempDir::new().unwrap();
        place(dir.path(), "other.example.org/dave/models/Rock/1", Some(MODEL_CONFIG));
        let cache = LocalCache::with_root(dir.path(), Vec::new());

        let models: Vec<Model> = cache.all_models().collect();
        assert_eq!(models.len(), 1);
        let server = models[0].identification().server();
        assert_eq!(server.url_string(), "https://other.example.org");
        assert!(server.version().is_empty());
    }

    #[test]
    fn owner_only_filter() {
        let (_dir, cache) = fixture();
        for owner in ["alice", "bob", "carol"] {
            let mut id = ModelIdentifier::default();
            id.set_server(ServerConfig::unset());
            id.set_owner(owner).unwrap();

            let matched: Vec<Model> = cache.matching_models(&id).collect();
            let expected = cache
                .all_models()
                .filter(|m| m.identification().owner() == owner)
                .count();
            assert!(!matched.is_empty());
            assert_eq!(matched.len(), expected, "{owner}");
            assert!(matched.iter().all(|m| m.identification().owner() == owner));
        }
    }

    #[test]
    fn server_and_name_filters() {
        let (_dir, cache) = fixture();
        let mut id = ModelIdentifier::default();
        id.set_server(server("http://localhost:8001"));
        assert_eq!(cache.matching_models(&id).count(), 2);

        id.set_name("Cone").unwrap();
        assert_eq!(cache.matching_models(&id).count(), 1);
    }

    #[test]
    fn exact_lookup() {
        let (_dir, cache) = fixture();
        let id =
            ModelIdentifier::new(server("https://fuel.example.org"), "alice", "Box").unwrap();

        let found = cache.matching_model(&id).unwrap();
        assert_eq!(found.identification().version(), 2);
        assert!(found.path_to_model().unwrap().ends_with("Box/2"));

        let mut first = id.clone();
        first.set_version(1);
        assert!(cache.matching_model(&first).is_some());

        let mut missing = id.clone();
        missing.set_version(3);
        assert!(cache.matching_model(&missing).is_none());

        let mut wrong_owner = id.clone();
        wrong_owner.set_owner("bob").unwrap();
        assert!(cache.matching_model(&wrong_owner).is_none());

        let mut wrong_name = id.clone();
        wrong_name.set_name("Sphere2").unwrap();
        assert!(cache.matching_model(&wrong_name).is_none());

        let mut wrong_server = id.clone();
        wrong_server.set_server(server("http://localhost:8001"));
        assert!(cache.matching_model(&wrong_server).is_none());

        let mut broken = id.clone();
        broken.set_name("Broken").unwrap();
        assert!(cache.matching_model(&broken).is_none());
    }

    #[tokio::test]
    async fn save_resolves_next_version() {
        let (_dir, cache) = fixture();
        let base =
            ModelIdentifier::new(server("https://fuel.example.org"), "alice", "Box").unwrap();

        let mut id = base.clone();
        let path = cache.save_model(&mut id, model_zip("three"), false).await.unwrap();
        assert_eq!(id.version(), 3);
        assert!(path.ends_with("Box/3"));

        let mut id = base.clone();
        cache.save_model(&mut id, model_zip("four"), false).await.unwrap();
        assert_eq!(id.version(), 4);

        let mut id = base.clone();
        id.set_version(2);
        let path = cache.save_model(&mut id, model_zip("two again"), true).await.unwrap();
        assert_eq!(id.version(), 2);
        assert_eq!(fs::read_to_string(path.join("marker.txt")).unwrap(), "two again");
        assert!(!path.join(METADATA_PBTXT).exists());
        assert!(!cache.resource_dir(&id).join("5").exists());
    }

    #[tokio::test]
    async fn save_without_overwrite_keeps_existing() {
        let (_dir, cache) = fixture();
        let mut id =
            ModelIdentifier::new(server("https://fuel.example.org"), "alice", "Box").unwrap();
        id.set_version(1);
        let err = cache.save_model(&mut id, model_zip("x"), false).await.unwrap_err();
        assert!(matches!(err, CacheError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn save_requires_a_manifest() {
        let (_dir, cache) = fixture();
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("readme.txt"), "no manifest").unwrap();
        let data = archive::compress_to_vec(src.path()).unwrap();

        let mut id =
            ModelIdentifier::new(server("https://fuel.example.org"), "alice", "Fresh").unwrap();
        let err = cache.save_model(&mut id, data, true).await.unwrap_err();
        assert!(matches!(err, CacheError::MissingManifest(_)));
        assert!(!cache.resource_dir(&id).join("1").exists());
        assert!(!cache.resource_dir(&id).join(".1.tmp").exists());
    }

    #[tokio::test]
    async fn save_requires_a_complete_identifier() {
        let (_dir, cache) = fixture();
        let mut id = ModelIdentifier::default();
        id.set_owner("alice").unwrap();
        let err = cache.save_model(&mut id, model_zip("x"), true).await.unwrap_err();
        assert!(matches!(err, CacheError::IncompleteIdentifier(_)));
    }

    #[tokio::test]
    async fn worlds_round_trip_through_the_cache() {
        let (_dir, cache) = fixture();
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("shapes.sdf"), "<sdf/>").unwrap();
        let data = archive::compress_to_vec(src.path()).unwrap();

        let mut id =
            WorldIdentifier::new(server("https://fuel.example.org"), "alice", "Shapes").unwrap();
        let path = cache.save_world(&mut id, data, false).await.unwrap();
        assert_eq!(id.version(), 1);
        assert_eq!(id.local_path(), Some(path.as_path()));

        let found = cache.matching_world(&id).unwrap();
        assert_eq!(found.local_path(), Some(path.as_path()));

        let mut by_owner = WorldIdentifier::default();
        by_owner.set_server(ServerConfig::unset());
        by_owner.set_owner("alice").unwrap();
        assert_eq!(cache.matching_worlds(&by_owner).count(), 2);
        assert_eq!(cache.all_worlds().count(), 2);
    }

    #[test]
    fn sdf_lookup() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.sdf"), "").unwrap();
        fs::write(dir.path().join("a.sdf"), "").unwrap();
        assert_eq!(sdf_from_path(dir.path()), Some(dir.path().join("a.sdf")));

        fs::write(
            dir.path().join(METADATA_PBTXT),
            "name: \"x\"\nmodel { file: \"b.sdf\" }",
        )
        .unwrap();
        assert_eq!(sdf_from_path(dir.path()), Some(dir.path().join("b.sdf")));

        let empty = TempDir::new().unwrap();
        assert_eq!(sdf_from_path(empty.path()), None);
    }
}
