use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::selection::{Publisher, SubscriptionId};

use super::codec::{AssetPayload, MemoryFile};
use super::Asset;

/// Lookup key for an asset name: spaces removed, lowercased.
pub fn normalize_asset_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != ' ')
        .collect::<String>()
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next: u64,
    live: HashMap<ResourceHandle, MemoryFile>,
}

#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl HandleRegistry {
    pub fn create(&self, file: MemoryFile) -> ResourceHandle {
        let mut state = self.lock();
        state.next += 1;
        let handle = ResourceHandle(format!("blob:catalog/{}", state.next));
        state.live.insert(handle.clone(), file);
        handle
    }

    pub fn resolve(&self, handle: &ResourceHandle) -> Option<MemoryFile> {
        self.lock().live.get(handle).cloned()
    }

    pub fn revoke(&self, handle: &ResourceHandle) -> bool {
        self.lock().live.remove(handle).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub type AssetUrls = BTreeMap<String, ResourceHandle>;

/// Each rebuild publishes a fresh map, then revokes the previous map's handles.
#[derive(Debug, Clone)]
pub struct AssetUrlCache {
    registry: HandleRegistry,
    urls: Publisher<Arc<AssetUrls>>,
}

impl Default for AssetUrlCache {
    fn default() -> Self {
        Self {
            registry: HandleRegistry::default(),
            urls: Publisher::new(Arc::new(AssetUrls::new())),
        }
    }
}

impl AssetUrlCache {
    pub fn current(&self) -> Arc<AssetUrls> {
        self.urls.current()
    }

    pub fn stream(&self) -> Receiver<Arc<AssetUrls>> {
        self.urls.stream()
    }

    pub fn subscribe(
        &self,
        callback: impl FnMut(&Arc<AssetUrls>) + Send + 'static,
    ) -> SubscriptionId {
        self.urls.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.urls.unsubscribe(id)
    }

    pub fn resolve(&self, handle: &ResourceHandle) -> Option<MemoryFile> {
        self.registry.resolve(handle)
    }

    pub fn live_handle_count(&self) -> usize {
        self.registry.live_count()
    }

    pub fn rebuild(&self, assets: &[Asset]) {
        let mut winners = BTreeMap::<String, &Asset>::new();
        for asset in assets {
            winners.insert(normalize_asset_name(&asset.name), asset);
        }

        let mut urls = AssetUrls::new();
        for (key, asset) in winners {
            match display_file(asset) {
                Ok(Some(file)) => {
                    urls.insert(key, self.registry.create(file));
                }
                Ok(None) => {
                    warn!(asset = %asset.name, "asset_url_skipped_without_payload");
                }
                Err(error) => {
                    warn!(asset = %asset.name, %error, "asset_url_skipped_unreadable");
                }
            }
        }

        let previous = self.urls.current();
        debug!(
            asset_count = urls.len(),
            revoked = previous.len(),
            "asset_urls_rebuilt"
        );
        self.urls.publish(Arc::new(urls));
        for handle in previous.values() {
            self.registry.revoke(handle);
        }
    }
}

fn display_file(asset: &Asset) -> io::Result<Option<MemoryFile>> {
    match &asset.file {
        Some(AssetPayload::Live(source)) => Ok(Some(MemoryFile::new(
            source.name(),
            source.mime_type(),
            source.read_all()?,
        ))),
        Some(AssetPayload::AtRest { .. }) | None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str, bytes: &[u8]) -> Asset {
        Asset::new(name, AssetPayload::live(MemoryFile::new(name, "image/png", bytes)))
    }

    #[test]
    fn normalization_strips_spaces_and_case() {
        assert_eq!(normalize_asset_name("My  Card"), "mycard");
        assert_eq!(normalize_asset_name("MYCARD"), "mycard");
        assert_eq!(normalize_asset_name(" Red Gem "), "redgem");
    }

    #[test]
    fn rebuild_revokes_handles_from_previous_map() {
        let cache = AssetUrlCache::default();
        cache.rebuild(&[asset("Card Back", b"1"), asset("Gem", b"2")]);
        let first = cache.current();
        assert_eq!(cache.live_handle_count(), 2);

        cache.rebuild(&[asset("Gem", b"3")]);

        assert_eq!(cache.live_handle_count(), 1);
        for handle in first.values() {
            assert!(cache.resolve(handle).is_none());
        }
        let gem = cache.current().get("gem").cloned().expect("gem handle");
        assert_eq!(cache.resolve(&gem).expect("gem file").bytes(), b"3");
    }

    #[test]
    fn later_asset_wins_on_key_collision() {
        let cache = AssetUrlCache::default();
        cache.rebuild(&[asset("Red Gem", b"old"), asset("redgem", b"new")]);

        let urls = cache.current();
        assert_eq!(urls.len(), 1);
        assert_eq!(cache.live_handle_count(), 1);
        let handle = urls.get("redgem").expect("handle");
        assert_eq!(cache.resolve(handle).expect("file").bytes(), b"new");
    }

    #[test]
    fn assets_without_live_payload_are_skipped() {
        let cache = AssetUrlCache::default();
        let mut bare = asset("Bare", b"");
        bare.file = None;
        cache.rebuild(&[bare, asset("Kept", b"k")]);

        let keys = cache.current().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["kept".to_string()]);
    }

    #[test]
    fn stream_sees_each_rebuild() {
        let cache = AssetUrlCache::default();
        let stream = cache.stream();
        cache.rebuild(&[asset("One", b"1")]);

        assert!(stream.try_recv().expect("replay").is_empty());
        assert!(stream.try_recv().expect("rebuild").contains_key("one"));
    }
}
