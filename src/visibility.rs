//! Per-stage visibility collection

use std::collections::{BTreeMap, HashMap};

use glam::Vec3;

use crate::backend::{RenderContext, ResourceFactory};
use crate::error::RenderResult;
use crate::pipeline::SwappableRenderItem;
use crate::queue::RenderQueue;
use crate::resources::DeviceObjectCache;
use crate::scene::BoundingFrustum;

/// Identifier of a render item registered with a visibility manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub(crate) u32);

impl ItemId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Feeds the visible items of a stage into a render queue.
///
/// Every item added participates in the stage and was not culled by the
/// frustum used for the collection.
pub trait VisibilityManager {
    /// Collect with the frustum registered for `stage`, or everything if none is
    fn collect_visible_objects(
        &self,
        queue: &mut RenderQueue<ItemId>,
        stage: &str,
        viewpoint: Vec3,
    ) -> usize;

    /// Collect with an explicit frustum; returns the number of items added
    fn collect_visible_objects_in(
        &self,
        queue: &mut RenderQueue<ItemId>,
        stage: &str,
        viewpoint: Vec3,
        frustum: &BoundingFrustum,
    ) -> usize;

    fn item_mut(&mut self, id: ItemId) -> Option<&mut dyn SwappableRenderItem>;
}

/// Owns the scene's render items and culls them per stage.
///
/// Ids come from a counter, so a removed id is never handed out again and
/// iteration follows insertion order.
#[derive(Default)]
pub struct SceneVisibilityManager {
    items: BTreeMap<ItemId, Box<dyn SwappableRenderItem>>,
    next_id: u32,
    stage_frustums: HashMap<String, BoundingFrustum>,
}

impl SceneVisibilityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: Box<dyn SwappableRenderItem>) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        self.items.insert(id, item);
        id
    }

    /// Unregister an item; its id is never reused
    pub fn remove(&mut self, id: ItemId) -> Option<Box<dyn SwappableRenderItem>> {
        self.items.remove(&id)
    }

    /// Frustum used by [`VisibilityManager::collect_visible_objects`] for `stage`
    pub fn set_stage_frustum(&mut self, stage: &str, frustum: BoundingFrustum) {
        self.stage_frustums.insert(stage.to_string(), frustum);
    }

    pub fn stage_frustum(&self, stage: &str) -> Option<&BoundingFrustum> {
        self.stage_frustums.get(stage)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &dyn SwappableRenderItem)> {
        self.items.iter().map(|(id, item)| (*id, item.as_ref()))
    }

    /// Rebuild the device objects of every item for a new context
    pub fn change_render_context(
        &mut self,
        rc: &mut dyn RenderContext,
        cache: &mut DeviceObjectCache,
    ) -> RenderResult<()> {
        for item in self.items.values_mut() {
            item.change_render_context(rc, cache)?;
        }
        Ok(())
    }

    /// Destroy the device objects of every item, keeping the items registered
    pub fn release_all(&mut self, factory: &mut dyn ResourceFactory) {
        for item in self.items.values_mut() {
            item.dispose(factory);
        }
    }

    /// Destroy the device objects of every item and unregister them all
    pub fn dispose_all(&mut self, factory: &mut dyn ResourceFactory) {
        self.release_all(factory);
        self.items.clear();
    }
}

fn participates(item: &dyn SwappableRenderItem, stage: &str) -> bool {
    item.stages_participated().iter().any(|s| *s == stage)
}

impl VisibilityManager for SceneVisibilityManager {
    fn collect_visible_objects(
        &self,
        queue: &mut RenderQueue<ItemId>,
        stage: &str,
        viewpoint: Vec3,
    ) -> usize {
        let everything = BoundingFrustum::everything();
        let frustum = self.stage_frustums.get(stage).unwrap_or(&everything);
        self.collect_visible_objects_in(queue, stage, viewpoint, frustum)
    }

    fn collect_visible_objects_in(
        &self,
        queue: &mut RenderQueue<ItemId>,
        stage: &str,
        viewpoint: Vec3,
        frustum: &BoundingFrustum,
    ) -> usize {
        let mut added = 0;
        for (id, item) in self.iter() {
            if !participates(item, stage) || item.cull(frustum) {
                continue;
            }
            queue.add(id, item.render_order_key(viewpoint));
            added += 1;
        }
        added
    }

    fn item_mut(&mut self, id: ItemId) -> Option<&mut dyn SwappableRenderItem> {
        match self.items.get_mut(&id) {
            Some(item) => Some(item.as_mut()),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::backend::HeadlessContext;
    use crate::test_support::{render_log, ProbeItem};
    use crate::BackendType;

    fn collected(manager: &SceneVisibilityManager, stage: &str) -> Vec<ItemId> {
        let mut queue = RenderQueue::new();
        manager.collect_visible_objects(&mut queue, stage, Vec3::ZERO);
        queue.sort();
        queue.iter().copied().collect()
    }

    #[test]
    fn test_only_participants_are_collected() {
        let log = render_log();
        let mut manager = SceneVisibilityManager::new();
        let standard = manager.add(Box::new(ProbeItem::new(1, &["Standard"], &log)));
        let both = manager.add(Box::new(ProbeItem::new(2, &["ShadowMap", "Standard"], &log)));

        assert_eq!(collected(&manager, "Standard"), vec![standard, both]);
        assert_eq!(collected(&manager, "ShadowMap"), vec![both]);
        assert!(collected(&manager, "Overlay").is_empty());
    }

    #[test]
    fn test_culled_items_are_skipped() {
        let log = render_log();
        let mut manager = SceneVisibilityManager::new();
        manager.add(Box::new(ProbeItem::new(1, &["Standard"], &log).culled()));
        let visible = manager.add(Box::new(ProbeItem::new(2, &["Standard"], &log)));

        let mut queue = RenderQueue::new();
        let added = manager.collect_visible_objects_in(
            &mut queue,
            "Standard",
            Vec3::ZERO,
            &BoundingFrustum::everything(),
        );
        assert_eq!(added, 1);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![visible]);
    }

    #[test]
    fn test_keys_come_from_items() {
        let log = render_log();
        let mut manager = SceneVisibilityManager::new();
        let far = manager.add(Box::new(ProbeItem::new(1, &["Standard"], &log).with_key(9)));
        let near = manager.add(Box::new(ProbeItem::new(2, &["Standard"], &log).with_key(3)));
        assert_eq!(collected(&manager, "Standard"), vec![near, far]);
    }

    #[test]
    fn test_removed_ids_are_not_reused() {
        let log = render_log();
        let mut manager = SceneVisibilityManager::new();
        let first = manager.add(Box::new(ProbeItem::new(1, &["Standard"], &log)));
        assert!(manager.remove(first).is_some());
        let second = manager.add(Box::new(ProbeItem::new(2, &["Standard"], &log)));

        assert_ne!(first, second);
        assert!(manager.item_mut(first).is_none());
        assert!(manager.item_mut(second).is_some());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_change_render_context_reaches_every_item() {
        let log = render_log();
        let mut manager = SceneVisibilityManager::new();
        let kept = ProbeItem::new(1, &["Standard"], &log);
        let removed = ProbeItem::new(2, &["Standard"], &log);
        let (kept_swaps, removed_swaps) = (Rc::clone(&kept.swaps), Rc::clone(&removed.swaps));
        manager.add(Box::new(kept));
        let removed_id = manager.add(Box::new(removed));
        manager.remove(removed_id);

        let mut rc = HeadlessContext::new(BackendType::OpenGL, 8, 8).unwrap();
        let mut cache = DeviceObjectCache::new();
        manager.change_render_context(&mut rc, &mut cache).unwrap();
        manager.change_render_context(&mut rc, &mut cache).unwrap();

        assert_eq!(kept_swaps.get(), 2);
        assert_eq!(removed_swaps.get(), 0);
    }

    #[test]
    fn test_dispose_all_unregisters() {
        let log = render_log();
        let mut manager = SceneVisibilityManager::new();
        manager.add(Box::new(ProbeItem::new(1, &["Standard"], &log)));
        let mut rc = HeadlessContext::new(BackendType::Vulkan, 8, 8).unwrap();
        manager.dispose_all(rc.resource_factory());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_release_all_keeps_items() {
        let log = render_log();
        let mut manager = SceneVisibilityManager::new();
        let id = manager.add(Box::new(ProbeItem::new(1, &["Standard"], &log)));
        let mut rc = HeadlessContext::new(BackendType::OpenGL, 8, 8).unwrap();
        manager.release_all(rc.resource_factory());
        assert!(manager.item_mut(id).is_some());
        assert_eq!(collected(&manager, "Standard"), vec![id]);
    }

    #[test]
    fn test_removed_items_free_their_slot() {
        let log = render_log();
        let mut manager = SceneVisibilityManager::new();
        for tag in 0..100 {
            let id = manager.add(Box::new(ProbeItem::new(tag, &["Standard"], &log)));
            manager.remove(id);
        }
        let last = manager.add(Box::new(ProbeItem::new(100, &["Standard"], &log)));
        assert_eq!(manager.items.len(), 1);
        assert_eq!(last.index(), 100);
        assert_eq!(collected(&manager, "Standard"), vec![last]);
    }
}
