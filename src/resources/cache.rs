//! Device objects shared by every instance of a render item type

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use crate::backend::traits::*;

/// A bundle of device objects that can be cached per type
pub trait DeviceObjects: Any {
    fn destroy(&self, factory: &mut dyn ResourceFactory);
}

struct CacheEntry {
    objects: Rc<dyn Any>,
    release: fn(&dyn Any, &mut dyn ResourceFactory),
}

fn release<T: DeviceObjects>(objects: &dyn Any, factory: &mut dyn ResourceFactory) {
    if let Some(objects) = objects.downcast_ref::<T>() {
        objects.destroy(factory);
    }
}

/// Cache of [`DeviceObjects`] keyed by their type.
///
/// The cache belongs to one render context at a time. Asking for objects
/// with a different context drops everything cached for the old one, whose
/// device objects die with that context.
#[derive(Default)]
pub struct DeviceObjectCache {
    owner: Option<ContextId>,
    entries: HashMap<TypeId, CacheEntry>,
}

impl DeviceObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached objects of type `T`, created with `init` on first use
    pub fn get_or_create<T, F>(&mut self, rc: &mut dyn RenderContext, init: F) -> BackendResult<Rc<T>>
    where
        T: DeviceObjects,
        F: FnOnce(&mut dyn ResourceFactory) -> BackendResult<T>,
    {
        let context = rc.context_id();
        if self.owner != Some(context) {
            if !self.entries.is_empty() {
                log::debug!(
                    "Device object cache moved to context #{}, dropping {} entries",
                    context.value(),
                    self.entries.len()
                );
            }
            self.entries.clear();
            self.owner = Some(context);
        }

        let key = TypeId::of::<T>();
        if let Some(entry) = self.entries.get(&key) {
            if let Ok(objects) = Rc::clone(&entry.objects).downcast::<T>() {
                return Ok(objects);
            }
        }

        let objects = Rc::new(init(rc.resource_factory())?);
        self.entries.insert(
            key,
            CacheEntry {
                objects: objects.clone(),
                release: release::<T>,
            },
        );
        Ok(objects)
    }

    /// Destroy every entry on `factory`, which must belong to the owning context
    pub fn release_all(&mut self, factory: &mut dyn ResourceFactory) {
        for (_, entry) in self.entries.drain() {
            (entry.release)(entry.objects.as_ref(), factory);
        }
    }

    pub fn owner(&self) -> Option<ContextId> {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DeviceObjects for BufferHandle {
    fn destroy(&self, factory: &mut dyn ResourceFactory) {
        factory.destroy((*self).into());
    }
}

/// Device objects owned by one item, tagged with the context that built them
#[derive(Debug)]
pub struct ContextObjects<T> {
    slot: Option<(ContextId, T)>,
}

impl<T: DeviceObjects> ContextObjects<T> {
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Replace the held objects with ones built by `init` on `rc`.
    ///
    /// Objects built on `rc` earlier are destroyed first; objects of any
    /// other context are forgotten.
    pub fn rebuild<F>(&mut self, rc: &mut dyn RenderContext, init: F) -> BackendResult<&T>
    where
        F: FnOnce(&mut dyn ResourceFactory) -> BackendResult<T>,
    {
        self.release(rc);
        let objects = init(rc.resource_factory())?;
        let (_, objects) = self.slot.insert((rc.context_id(), objects));
        Ok(&*objects)
    }

    /// Destroy the objects if `rc` built them, forget them otherwise
    pub fn release(&mut self, rc: &mut dyn RenderContext) {
        if let Some((owner, objects)) = self.slot.take() {
            if owner == rc.context_id() {
                objects.destroy(rc.resource_factory());
            }
        }
    }

    /// Destroy the objects on the factory of the context that built them
    pub fn dispose(&mut self, factory: &mut dyn ResourceFactory) {
        if let Some((_, objects)) = self.slot.take() {
            objects.destroy(factory);
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.slot.as_ref().map(|(_, objects)| objects)
    }

    pub fn owner(&self) -> Option<ContextId> {
        self.slot.as_ref().map(|(owner, _)| *owner)
    }

    pub fn is_some(&self) -> bool {
        self.slot.is_some()
    }
}

impl<T: DeviceObjects> Default for ContextObjects<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeviceObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceObjectCache")
            .field("owner", &self.owner)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::ShaderConstantType;
    use crate::backend::HeadlessContext;
    use crate::BackendType;

    struct Shared {
        buffer: BufferHandle,
    }

    impl DeviceObjects for Shared {
        fn destroy(&self, factory: &mut dyn ResourceFactory) {
            factory.destroy(self.buffer.into());
        }
    }

    fn create(factory: &mut dyn ResourceFactory) -> BackendResult<Shared> {
        Ok(Shared {
            buffer: factory.create_constant_buffer(ShaderConstantType::Float4, "shared")?,
        })
    }

    #[test]
    fn test_created_once_per_context() {
        let mut ctx = HeadlessContext::new(BackendType::Vulkan, 8, 8).unwrap();
        let mut cache = DeviceObjectCache::new();

        let first = cache.get_or_create(&mut ctx, create).unwrap();
        let second = cache
            .get_or_create::<Shared, _>(&mut ctx, |_| panic!("cached objects were rebuilt"))
            .unwrap();
        assert_eq!(first.buffer, second.buffer);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_new_context_rebuilds() {
        let mut old = HeadlessContext::new(BackendType::OpenGL, 8, 8).unwrap();
        let mut new = HeadlessContext::new(BackendType::Direct3D11, 8, 8).unwrap();
        let mut cache = DeviceObjectCache::new();

        let before = cache.get_or_create(&mut old, create).unwrap();
        let after = cache.get_or_create(&mut new, create).unwrap();
        assert_ne!(before.buffer, after.buffer);
        assert_eq!(cache.owner(), Some(new.context_id()));
    }

    #[test]
    fn test_release_all_destroys() {
        let mut ctx = HeadlessContext::new(BackendType::Vulkan, 8, 8).unwrap();
        let mut cache = DeviceObjectCache::new();
        let live = ctx.factory().live_objects();
        cache.get_or_create(&mut ctx, create).unwrap();
        assert_eq!(ctx.factory().live_objects(), live + 1);

        cache.release_all(ctx.resource_factory());
        assert!(cache.is_empty());
        assert_eq!(ctx.factory().live_objects(), live);
    }

    #[test]
    fn test_context_objects_rebuild_on_same_context_destroys_previous() {
        let mut ctx = HeadlessContext::new(BackendType::OpenGL, 8, 8).unwrap();
        let live = ctx.factory().live_objects();
        let mut objects = ContextObjects::new();

        let first = objects.rebuild(&mut ctx, create).unwrap().buffer;
        let second = objects.rebuild(&mut ctx, create).unwrap().buffer;
        assert_ne!(first, second);
        assert_eq!(ctx.factory().live_objects(), live + 1);
        assert_eq!(objects.owner(), Some(ctx.context_id()));

        objects.dispose(ctx.resource_factory());
        assert!(!objects.is_some());
        assert_eq!(ctx.factory().live_objects(), live);
    }

    #[test]
    fn test_context_objects_forget_other_context() {
        let mut old = HeadlessContext::new(BackendType::Vulkan, 8, 8).unwrap();
        let mut new = HeadlessContext::new(BackendType::OpenGLES, 8, 8).unwrap();
        let new_live = new.factory().live_objects();
        let mut objects = ContextObjects::new();

        objects.rebuild(&mut old, create).unwrap();
        let old_live = old.factory().live_objects();
        objects.rebuild(&mut new, create).unwrap();

        assert_eq!(old.factory().live_objects(), old_live);
        assert_eq!(new.factory().live_objects(), new_live + 1);
        assert_eq!(objects.owner(), Some(new.context_id()));
    }

    #[test]
    fn test_context_objects_release_ignores_foreign_context() {
        let mut owner = HeadlessContext::new(BackendType::OpenGL, 8, 8).unwrap();
        let mut other = HeadlessContext::new(BackendType::Direct3D11, 8, 8).unwrap();
        let mut objects = ContextObjects::new();
        objects.rebuild(&mut owner, create).unwrap();
        let live = owner.factory().live_objects();

        objects.release(&mut other);
        assert!(!objects.is_some());
        assert_eq!(owner.factory().live_objects(), live);
    }
}
