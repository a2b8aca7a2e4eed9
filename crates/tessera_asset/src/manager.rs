//! Cached, hot-reloadable asset loading

use crate::{AssetError, AssetSource};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tessera_core::ecs::World;
use tracing::{debug, error};

/// Identity of an asset: its kind plus a name unique within that kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId {
    pub kind: String,
    pub name: String,
}

impl AssetId {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Everything an [`Asset`] gets when it is (re)loaded.
pub struct LoadRequest<'a> {
    pub id: &'a AssetId,
    pub content: &'a str,
    /// For loading dependencies.
    pub manager: &'a AssetManager,
}

/// A type the [`AssetManager`] can load from text.
pub trait Asset: Send + Sync + Sized + 'static {
    const KIND: &'static str;
    const EXTENSION: &'static str;

    fn load(request: &LoadRequest<'_>) -> Result<Arc<Self>, AssetError>;

    /// Update `self` in place from new content. On error the previous
    /// state must be kept.
    fn reload(&self, request: &LoadRequest<'_>, world: &World) -> Result<(), AssetError>;
}

pub type WatchId = u32;

type Shared = Arc<dyn Any + Send + Sync>;
type ReloadFn = fn(&(dyn Any + Send + Sync), &LoadRequest<'_>, &World) -> Result<(), AssetError>;
type WatchCallback = Arc<dyn Fn(&AssetId) + Send + Sync>;

fn reload_as<A: Asset>(
    data: &(dyn Any + Send + Sync),
    request: &LoadRequest<'_>,
    world: &World,
) -> Result<(), AssetError> {
    match data.downcast_ref::<A>() {
        Some(asset) => asset.reload(request, world),
        None => Err(AssetError::WrongType(request.id.clone())),
    }
}

struct Entry {
    data: Shared,
    path: String,
    version: Option<u64>,
    reloader: ReloadFn,
}

struct Watch {
    id: WatchId,
    asset: AssetId,
    path: String,
    version: Option<u64>,
    callback: WatchCallback,
}

/// Loads assets from an [`AssetSource`], shares them through `Arc`, and
/// re-reads them in place when their source changes.
///
/// No lock is held while an asset's own `load`/`reload` runs, so assets may
/// load their dependencies through the manager.
pub struct AssetManager {
    source: Arc<dyn AssetSource>,
    kinds: RwLock<HashMap<String, String>>,
    assets: Mutex<HashMap<AssetId, Entry>>,
    loading: Mutex<HashSet<AssetId>>,
    watches: Mutex<Vec<Watch>>,
    next_watch: AtomicU32,
}

impl AssetManager {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self {
            source,
            kinds: RwLock::new(HashMap::new()),
            assets: Mutex::new(HashMap::new()),
            loading: Mutex::new(HashSet::new()),
            watches: Mutex::new(Vec::new()),
            next_watch: AtomicU32::new(1),
        }
    }

    /// Look up assets of `kind` under `base` instead of a directory named
    /// after the kind. An empty base means the source root.
    pub fn map_kind(&self, kind: impl Into<String>, base: impl Into<String>) {
        self.kinds.write().insert(kind.into(), base.into());
    }

    fn path_of(&self, id: &AssetId, extension: &str) -> String {
        let kinds = self.kinds.read();
        let base = kinds.get(&id.kind).map_or(id.kind.as_str(), String::as_str);
        if base.is_empty() {
            format!("{}.{extension}", id.name)
        } else {
            format!("{}/{}.{extension}", base.trim_end_matches('/'), id.name)
        }
    }

    /// Load (or fetch from cache) the asset `A` called `name`.
    pub fn load<A: Asset>(&self, name: &str) -> Result<Arc<A>, AssetError> {
        let id = AssetId::new(A::KIND, name);
        if let Some(entry) = self.assets.lock().get(&id) {
            return Arc::clone(&entry.data)
                .downcast::<A>()
                .map_err(|_| AssetError::WrongType(id.clone()));
        }

        if !self.loading.lock().insert(id.clone()) {
            return Err(AssetError::ImportCycle(id));
        }
        let loaded = self.load_uncached::<A>(&id);
        self.loading.lock().remove(&id);
        let (asset, path, version) = loaded?;

        let mut assets = self.assets.lock();
        // A nested load may have cached the same id while we were unlocked.
        if let Some(entry) = assets.get(&id) {
            return Arc::clone(&entry.data)
                .downcast::<A>()
                .map_err(|_| AssetError::WrongType(id.clone()));
        }
        debug!(asset = %id, path = %path, "loaded asset");
        let data: Shared = asset.clone();
        assets.insert(
            id,
            Entry {
                data,
                path,
                version,
                reloader: reload_as::<A>,
            },
        );
        Ok(asset)
    }

    fn load_uncached<A: Asset>(
        &self,
        id: &AssetId,
    ) -> Result<(Arc<A>, String, Option<u64>), AssetError> {
        let path = self.path_of(id, A::EXTENSION);
        let version = self.source.modified(&path);
        let content = self
            .source
            .read(&path)?
            .ok_or_else(|| AssetError::NotFound(id.clone()))?;
        let asset = A::load(&LoadRequest {
            id,
            content: &content,
            manager: self,
        })?;
        Ok((asset, path, version))
    }

    /// Like [`load`](Self::load), but logs failures instead of returning them.
    pub fn load_maybe<A: Asset>(&self, name: &str) -> Option<Arc<A>> {
        match self.load::<A>(name) {
            Ok(asset) => Some(asset),
            Err(e) => {
                error!(kind = A::KIND, name, "failed to load asset: {e}");
                None
            }
        }
    }

    /// Whether `name` is cached or present in the source.
    pub fn exists<A: Asset>(&self, name: &str) -> bool {
        let id = AssetId::new(A::KIND, name);
        if self.assets.lock().contains_key(&id) {
            return true;
        }
        matches!(self.source.read(&self.path_of(&id, A::EXTENSION)), Ok(Some(_)))
    }

    /// Cached ids of `kind`, sorted.
    pub fn list(&self, kind: &str) -> Vec<AssetId> {
        let mut ids: Vec<_> = self
            .assets
            .lock()
            .keys()
            .filter(|id| id.kind == kind)
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Re-read every cached asset whose source changed and update it in
    /// place, then fire watches. Returns the ids that reloaded successfully.
    ///
    /// A failed reload keeps the previous content.
    pub fn reload(&self, world: &World) -> Vec<AssetId> {
        let mut stale: Vec<(AssetId, Shared, String, Option<u64>, ReloadFn)> = self
            .assets
            .lock()
            .iter()
            .filter_map(|(id, entry)| {
                let current = self.source.modified(&entry.path);
                (current.is_some() && current > entry.version).then(|| {
                    (
                        id.clone(),
                        Arc::clone(&entry.data),
                        entry.path.clone(),
                        current,
                        entry.reloader,
                    )
                })
            })
            .collect();
        stale.sort_by(|a, b| a.0.cmp(&b.0));

        let mut reloaded = Vec::new();
        for (id, data, path, version, reloader) in stale {
            if self.reload_entry(&id, &*data, &path, reloader, world) {
                reloaded.push(id.clone());
            }
            if let Some(entry) = self.assets.lock().get_mut(&id) {
                entry.version = version;
            }
        }

        self.fire_watches(None);
        reloaded
    }

    fn reload_entry(
        &self,
        id: &AssetId,
        data: &(dyn Any + Send + Sync),
        path: &str,
        reloader: ReloadFn,
        world: &World,
    ) -> bool {
        let content = match self.source.read(path) {
            Ok(Some(content)) => content,
            Ok(None) => {
                error!(asset = %id, path, "asset disappeared from its source");
                return false;
            }
            Err(e) => {
                error!(asset = %id, "failed to read asset for reload: {e}");
                return false;
            }
        };
        let request = LoadRequest {
            id,
            content: &content,
            manager: self,
        };
        match reloader(data, &request, world) {
            Ok(()) => {
                debug!(asset = %id, "reloaded asset");
                true
            }
            Err(e) => {
                error!(asset = %id, "failed to reload asset, keeping previous content: {e}");
                false
            }
        }
    }

    /// Reload a cached asset regardless of its source version. Returns
    /// `Ok(false)` if the asset is not cached.
    pub fn force_reload<A: Asset>(&self, name: &str, world: &World) -> Result<bool, AssetError> {
        let id = AssetId::new(A::KIND, name);
        let Some((data, path)) = self
            .assets
            .lock()
            .get(&id)
            .map(|entry| (Arc::clone(&entry.data), entry.path.clone()))
        else {
            return Ok(false);
        };

        let version = self.source.modified(&path);
        let content = self
            .source
            .read(&path)?
            .ok_or_else(|| AssetError::NotFound(id.clone()))?;
        reload_as::<A>(
            &*data,
            &LoadRequest {
                id: &id,
                content: &content,
                manager: self,
            },
            world,
        )?;
        if let Some(entry) = self.assets.lock().get_mut(&id) {
            entry.version = version;
        }
        self.fire_watches(Some(&id));
        Ok(true)
    }

    /// Call `callback` whenever the source of `name` changes. Checked during
    /// [`reload`](Self::reload).
    pub fn watch<A: Asset>(
        &self,
        name: &str,
        callback: impl Fn(&AssetId) + Send + Sync + 'static,
    ) -> WatchId {
        let asset = AssetId::new(A::KIND, name);
        let path = self.path_of(&asset, A::EXTENSION);
        let id = self.next_watch.fetch_add(1, Ordering::Relaxed);
        let version = self.source.modified(&path);
        self.watches.lock().push(Watch {
            id,
            asset,
            path,
            version,
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unwatch(&self, id: WatchId) -> bool {
        let mut watches = self.watches.lock();
        match watches.iter().position(|w| w.id == id) {
            Some(at) => {
                watches.swap_remove(at);
                true
            }
            None => false,
        }
    }

    /// Fire watches whose source moved on; with `forced`, also fire every
    /// watch on that asset.
    fn fire_watches(&self, forced: Option<&AssetId>) {
        let due: Vec<(AssetId, WatchCallback)> = self
            .watches
            .lock()
            .iter_mut()
            .filter_map(|watch| {
                let current = self.source.modified(&watch.path);
                let changed = current.is_some() && current > watch.version;
                if changed || forced == Some(&watch.asset) {
                    watch.version = current;
                    Some((watch.asset.clone(), Arc::clone(&watch.callback)))
                } else {
                    None
                }
            })
            .collect();
        for (asset, callback) in due {
            callback(&asset);
        }
    }

    /// Drop cached assets nobody outside the cache references.
    pub fn shrink_to_fit(&self) {
        // Dropping a blueprint releases its parent, which may free that
        // parent on the next pass.
        loop {
            let released: Vec<Entry> = {
                let mut assets = self.assets.lock();
                let unused: Vec<AssetId> = assets
                    .iter()
                    .filter(|(_, entry)| Arc::strong_count(&entry.data) <= 1)
                    .map(|(id, _)| id.clone())
                    .collect();
                unused.iter().filter_map(|id| assets.remove(id)).collect()
            };
            if released.is_empty() {
                break;
            }
            debug!(count = released.len(), "released unused assets");
        }
    }
}

impl fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetManager")
            .field("cached", &self.assets.lock().len())
            .field("watches", &self.watches.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySource;
    use parking_lot::Mutex as PlMutex;

    /// Plain text asset used to exercise the cache.
    struct Note {
        text: PlMutex<String>,
    }

    impl Asset for Note {
        const KIND: &'static str = "note";
        const EXTENSION: &'static str = "txt";

        fn load(request: &LoadRequest<'_>) -> Result<Arc<Self>, AssetError> {
            if request.content.starts_with('!') {
                return Err(AssetError::invalid(request.id, "rejected"));
            }
            Ok(Arc::new(Note {
                text: PlMutex::new(request.content.to_owned()),
            }))
        }

        fn reload(&self, request: &LoadRequest<'_>, _world: &World) -> Result<(), AssetError> {
            if request.content.starts_with('!') {
                return Err(AssetError::invalid(request.id, "rejected"));
            }
            *self.text.lock() = request.content.to_owned();
            Ok(())
        }
    }

    /// Loads itself recursively to trigger cycle detection.
    struct Ouroboros;

    impl Asset for Ouroboros {
        const KIND: &'static str = "snake";
        const EXTENSION: &'static str = "txt";

        fn load(request: &LoadRequest<'_>) -> Result<Arc<Self>, AssetError> {
            request.manager.load::<Ouroboros>(request.content.trim())?;
            Ok(Arc::new(Ouroboros))
        }

        fn reload(&self, _: &LoadRequest<'_>, _: &World) -> Result<(), AssetError> {
            Ok(())
        }
    }

    fn setup() -> (Arc<MemorySource>, AssetManager) {
        let source = Arc::new(MemorySource::new());
        let manager = AssetManager::new(source.clone());
        (source, manager)
    }

    #[test]
    fn load_caches_and_shares() {
        let (source, manager) = setup();
        source.insert("note/hello.txt", "hi");

        let a = manager.load::<Note>("hello").expect("loads");
        let b = manager.load::<Note>("hello").expect("loads");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.list("note"), vec![AssetId::new("note", "hello")]);
        assert!(manager.exists::<Note>("hello"));
        assert!(!manager.exists::<Note>("nope"));
    }

    #[test]
    fn missing_asset_is_not_found() {
        let (_, manager) = setup();
        assert!(matches!(
            manager.load::<Note>("nope"),
            Err(AssetError::NotFound(_))
        ));
        assert!(manager.load_maybe::<Note>("nope").is_none());
    }

    #[test]
    fn mapped_kind_changes_lookup_path() {
        let (source, manager) = setup();
        manager.map_kind("note", "docs/notes");
        source.insert("docs/notes/a.txt", "mapped");
        let note = manager.load::<Note>("a").expect("loads");
        assert_eq!(*note.text.lock(), "mapped");
    }

    #[test]
    fn reload_updates_in_place_and_keeps_old_content_on_error() {
        let (source, manager) = setup();
        let world = World::new();
        source.insert("note/n.txt", "one");
        let note = manager.load::<Note>("n").expect("loads");

        assert!(manager.reload(&world).is_empty(), "nothing changed yet");

        source.insert("note/n.txt", "two");
        assert_eq!(manager.reload(&world), vec![AssetId::new("note", "n")]);
        assert_eq!(*note.text.lock(), "two");

        source.insert("note/n.txt", "!broken");
        assert!(manager.reload(&world).is_empty());
        assert_eq!(*note.text.lock(), "two");
        assert!(manager.reload(&world).is_empty(), "failed version is not retried");
    }

    #[test]
    fn force_reload_ignores_version() {
        let (source, manager) = setup();
        let world = World::new();
        source.insert("note/n.txt", "one");
        let note = manager.load::<Note>("n").expect("loads");

        assert!(manager.force_reload::<Note>("n", &world).expect("reloads"));
        assert!(!manager.force_reload::<Note>("other", &world).expect("not cached"));
        assert_eq!(*note.text.lock(), "one");
    }

    #[test]
    fn watches_fire_on_change_until_unwatched() {
        let (source, manager) = setup();
        let world = World::new();
        source.insert("note/w.txt", "one");

        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let watch = manager.watch::<Note>("w", move |id| {
            assert_eq!(id.name, "w");
            counter.fetch_add(1, Ordering::Relaxed);
        });

        manager.reload(&world);
        assert_eq!(hits.load(Ordering::Relaxed), 0);

        source.insert("note/w.txt", "two");
        manager.reload(&world);
        assert_eq!(hits.load(Ordering::Relaxed), 1);

        assert!(manager.unwatch(watch));
        assert!(!manager.unwatch(watch));
        source.insert("note/w.txt", "three");
        manager.reload(&world);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn self_import_is_a_cycle() {
        let (source, manager) = setup();
        source.insert("snake/a.txt", "b");
        source.insert("snake/b.txt", "a");
        assert!(matches!(
            manager.load::<Ouroboros>("a"),
            Err(AssetError::ImportCycle(id)) if id.name == "a"
        ));
        assert!(manager.list("snake").is_empty());
    }

    #[test]
    fn shrink_drops_unreferenced_assets() {
        let (source, manager) = setup();
        source.insert("note/keep.txt", "k");
        source.insert("note/drop.txt", "d");
        let keep = manager.load::<Note>("keep").expect("loads");
        drop(manager.load::<Note>("drop").expect("loads"));

        manager.shrink_to_fit();
        assert_eq!(manager.list("note"), vec![AssetId::new("note", "keep")]);
        drop(keep);
    }
}
