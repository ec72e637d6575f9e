//! Scene graph: an arena of entities with a root paint order.
//!
//! Entities are owned by the [`Scene`] and addressed by [`ElementId`].
//! Groups reference their children by id and children reference their
//! group through a non-owning parent id, so the tree has no ownership
//! cycles. All tree mutations go through the scene, which keeps parent
//! links, group child lists and group layouts consistent.

use std::collections::HashMap;
use std::fmt;
use std::ops::ControlFlow;

use crate::config::SceneConfig;
use crate::element::{
    apply_transform_to_entity, straighten_angle, Cacheable, Corners, ElementId, Entity,
    Transformable,
};
use crate::geometry::Point;
use crate::group::{Container, Group, LayoutStrategy};
use crate::matrix::{invert, multiply, Matrix};
use crate::observer::{SceneEvent, SceneObserver};
use crate::property::Property;
use crate::resource::ResourceLoader;
use crate::surface::RasterBuffer;
use crate::{SceneError, SceneResult};

/// Where an entity sits in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Painted directly by the scene.
    Root,
    /// Owned by a group.
    Child(ElementId),
    /// Held in the arena but not painted, e.g. after [`Scene::detach`].
    Detached,
}

/// Options for [`Scene::add_child_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddChildOptions {
    /// Paint-order position; `None` appends (front-most).
    pub index: Option<usize>,
    /// Keep the child's attributes as they are, interpreting them in the
    /// group's space, instead of preserving its canvas position.
    pub keep_relative: bool,
}

/// Result of [`Scene::dispose`].
#[derive(Debug)]
pub struct Disposed {
    /// The removed entity, with its cache released.
    pub entity: Entity,
    /// Former children, now detached with their canvas position preserved.
    pub orphans: Vec<ElementId>,
}

/// A scene containing all entities.
pub struct Scene {
    /// All entities in the scene, indexed by ID.
    pub(crate) entities: HashMap<ElementId, Entity>,
    /// Root entity IDs in paint order.
    pub(crate) roots: Vec<ElementId>,
    pub(crate) config: SceneConfig,
    observers: Vec<Box<dyn SceneObserver>>,
    batch_depth: usize,
    pending_layout: Vec<ElementId>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("entities", &self.entities.len())
            .field("roots", &self.roots)
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .field("batch_depth", &self.batch_depth)
            .finish_non_exhaustive()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Create an empty scene with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    /// Create an empty scene.
    #[must_use]
    pub fn with_config(config: SceneConfig) -> Self {
        Self {
            entities: HashMap::new(),
            roots: Vec::new(),
            config,
            observers: Vec::new(),
            batch_depth: 0,
            pending_layout: Vec::new(),
        }
    }

    /// The scene configuration.
    #[must_use]
    pub const fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Register an observer for scene events.
    pub fn subscribe(&mut self, observer: impl SceneObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Get an entity by ID.
    #[must_use]
    pub fn get(&self, id: ElementId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get an entity by ID.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`] if there is no such entity.
    pub fn entity(&self, id: ElementId) -> SceneResult<&Entity> {
        self.entities
            .get(&id)
            .ok_or(SceneError::ElementNotFound(id))
    }

    pub(crate) fn entity_mut(&mut self, id: ElementId) -> SceneResult<&mut Entity> {
        self.entities
            .get_mut(&id)
            .ok_or(SceneError::ElementNotFound(id))
    }

    /// Cache-state access for the paint driver.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`] if there is no such entity.
    pub fn cacheable_mut(&mut self, id: ElementId) -> SceneResult<&mut dyn Cacheable> {
        Ok(self.entity_mut(id)? as &mut dyn Cacheable)
    }

    /// Group data of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`] or [`SceneError::NotAGroup`].
    pub fn group(&self, id: ElementId) -> SceneResult<&Group> {
        self.entity(id)?
            .as_group()
            .ok_or(SceneError::NotAGroup(id))
    }

    fn group_mut(&mut self, id: ElementId) -> SceneResult<&mut Group> {
        self.entity_mut(id)?
            .kind
            .as_group_mut()
            .ok_or(SceneError::NotAGroup(id))
    }

    /// Children of a group in paint order.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`] or [`SceneError::NotAGroup`].
    pub fn children(&self, group: ElementId) -> SceneResult<&[ElementId]> {
        Ok(self.group(group)?.children())
    }

    /// Root entity IDs in paint order.
    #[must_use]
    pub fn roots(&self) -> &[ElementId] {
        &self.roots
    }

    /// Root entities in paint order.
    pub fn root_entities(&self) -> impl Iterator<Item = &Entity> {
        self.roots.iter().filter_map(|id| self.entities.get(id))
    }

    /// All entities, in no particular order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Number of entities held by the scene, detached ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the scene holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Where `id` sits in the scene.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`] if there is no such entity.
    pub fn placement(&self, id: ElementId) -> SceneResult<Placement> {
        let entity = self.entity(id)?;
        Ok(match entity.parent {
            Some(parent) => Placement::Child(parent),
            None if self.roots.contains(&id) => Placement::Root,
            None => Placement::Detached,
        })
    }

    /// Number of ancestors of `id`.
    fn depth(&self, id: ElementId) -> usize {
        let mut depth = 0;
        let mut current = self.entities.get(&id).and_then(|e| e.parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.entities.get(&parent).and_then(|e| e.parent);
        }
        depth
    }

    /// Whether `candidate` is `id` or one of its ancestors.
    fn is_self_or_ancestor(&self, candidate: ElementId, id: ElementId) -> bool {
        let mut current = Some(id);
        while let Some(cid) = current {
            if cid == candidate {
                return true;
            }
            current = self.entities.get(&cid).and_then(|e| e.parent);
        }
        false
    }

    // ------------------------------------------------------------------
    // Insertion and removal
    // ------------------------------------------------------------------

    /// Add an entity at the front of the root paint order.
    ///
    /// An entity already in the scene under the same id is disposed first.
    pub fn add(&mut self, entity: Entity) -> ElementId {
        let id = self.insert_detached(entity);
        self.roots.push(id);
        id
    }

    /// Hand an entity to the scene without painting it. It can later be
    /// placed with [`Scene::add_child`] or [`Scene::attach_root`].
    pub fn insert_detached(&mut self, mut entity: Entity) -> ElementId {
        let id = entity.id;
        if self.entities.contains_key(&id) {
            if let Err(err) = self.dispose(id) {
                tracing::warn!("Replacing {id} without re-layout: {err}");
                self.forget(id);
            }
        }
        entity.parent = None;
        if let Some(group) = entity.kind.as_group_mut() {
            group.children.clear();
        }
        self.entities.insert(id, entity);
        id
    }

    /// Put a detached entity back into the root paint order, front-most.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`], or
    /// [`SceneError::InvalidValue`] if the entity is currently a group child.
    pub fn attach_root(&mut self, id: ElementId) -> SceneResult<()> {
        match self.placement(id)? {
            Placement::Root => Ok(()),
            Placement::Child(group) => Err(SceneError::InvalidValue {
                property: "parent".to_string(),
                reason: format!("{id} is a child of {group}; remove it first"),
            }),
            Placement::Detached => {
                self.roots.push(id);
                Ok(())
            }
        }
    }

    /// Add `child` to the end of `group`, preserving its canvas position.
    ///
    /// # Errors
    ///
    /// See [`Scene::add_child_with`].
    pub fn add_child(&mut self, group: ElementId, child: ElementId) -> SceneResult<()> {
        self.add_child_with(group, child, AddChildOptions::default())
    }

    /// Add `child` to `group`.
    ///
    /// The child is unlinked from wherever it currently is. Unless
    /// `keep_relative` is set, its attributes are rewritten so it stays where
    /// it was on the canvas. If `child` is already in `group` it is only
    /// moved within the paint order. The group re-lays out afterwards when
    /// its strategy is automatic.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NotAGroup`] if `group` is a leaf,
    /// [`SceneError::CycleRejected`] if `child` is `group` or one of its
    /// ancestors, [`SceneError::NonInvertible`] if the group's transform is
    /// degenerate and the child must be re-based or a group whose layout
    /// follows an absolute clip path could not be re-laid out, or
    /// [`SceneError::ElementNotFound`]. The scene is unchanged on error.
    pub fn add_child_with(
        &mut self,
        group: ElementId,
        child: ElementId,
        options: AddChildOptions,
    ) -> SceneResult<()> {
        let target = self.group(group)?;
        self.entity(child)?;
        if self.is_self_or_ancestor(child, group) {
            return Err(SceneError::CycleRejected { group, child });
        }

        if let Some(from) = target.child_index(child) {
            let children = &mut self.group_mut(group)?.children;
            children.remove(from);
            let index = options.index.unwrap_or(children.len()).min(children.len());
            children.insert(index, child);
            tracing::trace!("Moved {child} to index {index} in {group}");
            return Ok(());
        }

        if let Placement::Child(from) = self.placement(child)? {
            self.check_layout(from)?;
        }
        self.check_layout(group)?;

        let rebase = if options.keep_relative {
            None
        } else {
            let old_full = self.full_matrix(child)?;
            let inverse = invert(&self.full_matrix(group)?)?;
            Some(multiply(&inverse, &old_full))
        };

        self.unlink(child)?;

        let entity = self.entity_mut(child)?;
        if let Some(local) = rebase {
            apply_transform_to_entity(entity, &local);
        }
        entity.parent = Some(group);
        let children = &mut self.group_mut(group)?.children;
        let index = options.index.unwrap_or(children.len()).min(children.len());
        children.insert(index, child);

        tracing::debug!("Added {child} to {group} at index {index}");
        self.emit(&SceneEvent::ChildAdded { group, child });
        self.schedule_layout(group)
    }

    /// Remove `child` from `group` and hand it back to the caller.
    ///
    /// The returned entity has its canvas position baked into its own
    /// attributes and no longer belongs to the scene; it can be added again
    /// with [`Scene::add`]. If it is a group, its former children stay in
    /// the scene as detached entities and are listed in
    /// [`Disposed::orphans`]. Use [`Scene::detach`] to keep the entity in the
    /// scene instead.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NotAChild`] if `child` is not a direct child of
    /// `group`, [`SceneError::NotAGroup`] / [`SceneError::ElementNotFound`],
    /// or [`SceneError::NonInvertible`] if `group` cannot be re-laid out.
    /// The scene is unchanged on error.
    pub fn remove_child(&mut self, group: ElementId, child: ElementId) -> SceneResult<Disposed> {
        if self.group(group)?.child_index(child).is_none() {
            return Err(SceneError::NotAChild { group, child });
        }
        self.dispose(child)
    }

    /// Take `id` out of the paint order, preserving its canvas position. It
    /// stays in the scene as a detached entity, addressable by its id.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`], or
    /// [`SceneError::NonInvertible`] if its group cannot be re-laid out.
    /// The scene is unchanged on error.
    pub fn detach(&mut self, id: ElementId) -> SceneResult<()> {
        if let Placement::Child(group) = self.placement(id)? {
            self.check_layout(group)?;
        }
        self.unlink(id)
    }

    fn detach_child(&mut self, group: ElementId, child: ElementId) -> SceneResult<()> {
        let index = self
            .group(group)?
            .child_index(child)
            .ok_or(SceneError::NotAChild { group, child })?;
        let full = self.full_matrix(child)?;

        self.group_mut(group)?.children.remove(index);
        let entity = self.entity_mut(child)?;
        entity.parent = None;
        apply_transform_to_entity(entity, &full);

        tracing::debug!("Removed {child} from {group}");
        self.emit(&SceneEvent::ChildRemoved { group, child });
        self.schedule_layout(group)
    }

    /// Take `id` out of its group or the root order. It stays in the arena.
    fn unlink(&mut self, id: ElementId) -> SceneResult<()> {
        match self.placement(id)? {
            Placement::Child(group) => self.detach_child(group, id),
            Placement::Root => {
                self.roots.retain(|r| *r != id);
                Ok(())
            }
            Placement::Detached => Ok(()),
        }
    }

    /// Drop `id` from the arena and every list referring to it, without
    /// re-layout. Its children become detached where they are.
    fn forget(&mut self, id: ElementId) {
        self.roots.retain(|r| *r != id);
        self.pending_layout.retain(|g| *g != id);
        let Some(mut entity) = self.entities.remove(&id) else {
            return;
        };
        if let Some(parent) = entity.parent {
            if let Ok(group) = self.group_mut(parent) {
                group.children.retain(|c| *c != id);
            }
        }
        if let Some(group) = entity.kind.as_group_mut() {
            for child in group.children.drain(..) {
                if let Some(child) = self.entities.get_mut(&child) {
                    child.parent = None;
                }
            }
        }
        entity.release_cache();
    }

    /// Remove an entity from the scene and release its cache.
    ///
    /// A group's children are detached first, keeping their canvas
    /// positions; they remain in the scene as detached entities and are
    /// listed in [`Disposed::orphans`]. [`Scene::dispose_tree`] removes the
    /// whole subtree instead.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`] if there is no such entity, or
    /// [`SceneError::NonInvertible`] if its group cannot be re-laid out.
    /// The scene is unchanged on error.
    pub fn dispose(&mut self, id: ElementId) -> SceneResult<Disposed> {
        if let Placement::Child(group) = self.placement(id)? {
            self.check_layout(group)?;
        }
        let children = self
            .entity(id)?
            .as_group()
            .map(|g| g.children().to_vec())
            .unwrap_or_default();

        let mut rebased = Vec::with_capacity(children.len());
        for child in &children {
            rebased.push((*child, self.full_matrix(*child)?));
        }
        self.unlink(id)?;
        for (child, full) in rebased {
            let entity = self.entity_mut(child)?;
            entity.parent = None;
            apply_transform_to_entity(entity, &full);
        }

        let mut entity = self
            .entities
            .remove(&id)
            .ok_or(SceneError::ElementNotFound(id))?;
        entity.release_cache();
        if let Some(group) = entity.kind.as_group_mut() {
            group.children.clear();
        }
        self.pending_layout.retain(|g| *g != id);

        tracing::debug!("Disposed {id}, {} orphans", children.len());
        self.emit(&SceneEvent::Disposed(id));
        Ok(Disposed {
            entity,
            orphans: children,
        })
    }

    /// Remove an entity and all of its descendants from the scene.
    ///
    /// Returns the removed entities, `id` first and then its descendants
    /// depth first, with their caches released.
    ///
    /// # Errors
    ///
    /// Same as [`Scene::dispose`]; the scene is unchanged on error.
    pub fn dispose_tree(&mut self, id: ElementId) -> SceneResult<Vec<Entity>> {
        let Disposed { entity, orphans } = self.dispose(id)?;
        let mut removed = vec![entity];
        let mut stack: Vec<ElementId> = orphans.into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            let Disposed { entity, orphans } = self.dispose(next)?;
            removed.push(entity);
            stack.extend(orphans.into_iter().rev());
        }
        tracing::debug!("Disposed tree of {id}, {} entities", removed.len());
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Set a property and re-lay out the affected groups.
    ///
    /// # Errors
    ///
    /// Returns the entity's validation error, or
    /// [`SceneError::ElementNotFound`].
    pub fn set(&mut self, id: ElementId, property: Property) -> SceneResult<()> {
        let geometry = property.is_geometry();
        let relayout_self = matches!(property, Property::Layout(_));
        let name = property.name().to_string();
        self.entity_mut(id)?.set(property)?;

        if geometry {
            self.emit(&SceneEvent::GeometryChanged {
                entity: id,
                property: name,
            });
            self.after_geometry_change(id)?;
        } else {
            self.emit(&SceneEvent::PropertyChanged {
                entity: id,
                property: name,
            });
        }
        if relayout_self {
            self.schedule_layout(id)?;
        }
        Ok(())
    }

    /// Set a property by camelCase name from a JSON value.
    ///
    /// Unknown names are stored as custom data, or rejected when the scene
    /// is configured with `strict_properties`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownProperty`] in strict mode,
    /// [`SceneError::InvalidValue`] for a malformed value, or
    /// [`SceneError::ElementNotFound`].
    pub fn set_property(
        &mut self,
        id: ElementId,
        name: &str,
        value: serde_json::Value,
    ) -> SceneResult<()> {
        let property = Property::from_json(name, value, self.config.strict_properties)?;
        self.set(id, property)
    }

    /// Rewrite the entity's attributes so its local matrix equals `matrix`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`].
    pub fn apply_transform(&mut self, id: ElementId, matrix: &Matrix) -> SceneResult<()> {
        apply_transform_to_entity(self.entity_mut(id)?, matrix);
        self.after_geometry_change(id)
    }

    /// Rotate to the nearest multiple of `step` degrees. Half-way angles
    /// round up, so 45 straightens to 90 with a step of 90.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`].
    pub fn straighten(&mut self, id: ElementId, step: f64) -> SceneResult<()> {
        let angle = straighten_angle(self.entity(id)?.geometry().angle, step);
        self.set(id, Property::Angle(angle))
    }

    /// Replace the clip path of `id`, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`], or
    /// [`SceneError::InvalidValue`] if `clip_path` is a group.
    pub fn set_clip_path(
        &mut self,
        id: ElementId,
        clip_path: Option<Entity>,
    ) -> SceneResult<Option<Entity>> {
        if let Some(clip) = &clip_path {
            Entity::check_clip_path(clip)?;
        }
        let entity = self.entity_mut(id)?;
        let previous = std::mem::replace(&mut entity.clip_path, clip_path.map(Box::new));
        entity.mark_dirty();
        self.emit(&SceneEvent::PropertyChanged {
            entity: id,
            property: "clipPath".to_string(),
        });
        self.after_clip_change(id)?;
        Ok(previous.map(|b| *b))
    }

    /// Set a property on the clip path of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidValue`] if `id` has no clip path, the
    /// clip's own validation error, or [`SceneError::ElementNotFound`].
    pub fn set_clip_property(&mut self, id: ElementId, property: Property) -> SceneResult<()> {
        let entity = self.entity_mut(id)?;
        let clip = entity
            .clip_path_mut()
            .ok_or_else(|| SceneError::invalid_value("clipPath", "entity has no clip path"))?;
        clip.set(property)?;
        entity.mark_dirty();
        self.emit(&SceneEvent::PropertyChanged {
            entity: id,
            property: "clipPath".to_string(),
        });
        self.after_clip_change(id)
    }

    /// Attach decoded pixels to an image entity.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidValue`] if `id` is not an image, or
    /// [`SceneError::ElementNotFound`].
    pub fn set_image_element(&mut self, id: ElementId, element: RasterBuffer) -> SceneResult<()> {
        let entity = self.entity_mut(id)?;
        let before = (entity.geometry().width, entity.geometry().height);
        entity.set_image_element(element)?;
        let after = (entity.geometry().width, entity.geometry().height);
        if before != after {
            self.after_geometry_change(id)?;
        }
        Ok(())
    }

    /// Resolve an image entity's `src` through `loader` and attach the
    /// pixels.
    ///
    /// # Errors
    ///
    /// Returns the loader's error, [`SceneError::InvalidValue`] if `id` is
    /// not an image, or [`SceneError::ElementNotFound`].
    pub async fn load_image<L>(&mut self, id: ElementId, loader: &L) -> SceneResult<()>
    where
        L: ResourceLoader + ?Sized,
    {
        let src = match &self.entity(id)?.kind {
            crate::element::EntityKind::Image(image) => image.src.clone(),
            other => {
                return Err(SceneError::invalid_value(
                    "src",
                    format!("not a property of {}", other.type_name()),
                ))
            }
        };
        tracing::debug!("Loading image {id} from {}", crate::resource::display_src(&src));
        let element = loader.load(&src).await?;
        self.set_image_element(id, element)
    }

    // ------------------------------------------------------------------
    // Layout scheduling
    // ------------------------------------------------------------------

    /// Defer group re-layout until [`Scene::flush_layout`]. Nested calls
    /// are counted; layout runs on the flush matching the first call.
    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Whether re-layout is currently deferred.
    #[must_use]
    pub const fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    /// Leave one level of batch mode. When the outermost batch ends, every
    /// group touched during the batch is re-laid out, innermost first.
    ///
    /// # Errors
    ///
    /// Returns the first layout error.
    pub fn flush_layout(&mut self) -> SceneResult<()> {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth > 0 {
            return Ok(());
        }
        let mut pending = std::mem::take(&mut self.pending_layout);
        pending.retain(|id| self.entities.contains_key(id));
        pending.sort_by_key(|id| std::cmp::Reverse(self.depth(*id)));
        tracing::debug!("Flushing layout for {} groups", pending.len());
        for group in pending {
            self.run_layout(group)?;
        }
        Ok(())
    }

    fn after_geometry_change(&mut self, id: ElementId) -> SceneResult<()> {
        let Some(parent) = self.entity(id)?.parent else {
            return Ok(());
        };
        if self.group(parent)?.layout().is_auto() {
            self.schedule_layout(parent)?;
        }
        Ok(())
    }

    fn after_clip_change(&mut self, id: ElementId) -> SceneResult<()> {
        let clip_layout = self
            .entity(id)?
            .as_group()
            .is_some_and(|g| g.layout() == LayoutStrategy::ClipPath);
        if clip_layout {
            self.schedule_layout(id)?;
        }
        Ok(())
    }

    /// Fail with the error a re-layout of `group` would hit, without
    /// mutating anything.
    ///
    /// Layout only fails when a group sized by an absolutely positioned clip
    /// path has a degenerate full matrix. Re-layout moves groups but never
    /// changes a determinant, so checking before a tree edit is enough.
    fn check_layout(&self, group: ElementId) -> SceneResult<()> {
        let mut current = Some(group);
        while let Some(gid) = current {
            let entity = self.entity(gid)?;
            let absolute_clip = entity.clip_path().is_some_and(|c| c.absolute_positioned);
            if absolute_clip && self.group(gid)?.layout() == LayoutStrategy::ClipPath {
                invert(&self.full_matrix(gid)?)?;
            }
            current = match entity.parent {
                Some(parent) if self.group(parent)?.layout().is_auto() => Some(parent),
                _ => None,
            };
        }
        Ok(())
    }

    fn schedule_layout(&mut self, group: ElementId) -> SceneResult<()> {
        if self.batch_depth > 0 {
            if !self.pending_layout.contains(&group) {
                self.pending_layout.push(group);
            }
            return Ok(());
        }
        self.run_layout(group)
    }

    /// Re-lay out `group`, then each auto-sized ancestor whose child box
    /// changed as a result.
    fn run_layout(&mut self, group: ElementId) -> SceneResult<()> {
        let mut current = Some(group);
        while let Some(gid) = current {
            if !self.recompute_layout(gid)? {
                break;
            }
            current = match self.entity(gid)?.parent {
                Some(parent) if self.group(parent)?.layout().is_auto() => Some(parent),
                _ => None,
            };
        }
        Ok(())
    }

    pub(crate) fn emit(&mut self, event: &SceneEvent) {
        for observer in &mut self.observers {
            observer.on_event(event);
        }
    }

    // ------------------------------------------------------------------
    // Transforms and hit testing
    // ------------------------------------------------------------------

    /// The local matrix of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`].
    pub fn local_matrix(&self, id: ElementId) -> SceneResult<Matrix> {
        Ok(self.entity(id)?.local_matrix())
    }

    /// The matrix from `id`'s centered box space to canvas space: its local
    /// matrix composed with every ancestor's.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`] if `id` or an ancestor is
    /// missing.
    pub fn full_matrix(&self, id: ElementId) -> SceneResult<Matrix> {
        let mut matrix = Matrix::IDENTITY;
        let mut current = Some(id);
        while let Some(cid) = current {
            let entity = self.entity(cid)?;
            matrix = multiply(&entity.local_matrix(), &matrix);
            current = entity.parent;
        }
        Ok(matrix)
    }

    /// Canvas-space corners of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`].
    pub fn corners(&self, id: ElementId) -> SceneResult<Corners> {
        let full = self.full_matrix(id)?;
        Ok(self.entity(id)?.corners_under(&full))
    }

    /// Canvas-space center of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`].
    pub fn center_point(&self, id: ElementId) -> SceneResult<Point> {
        Ok(self.full_matrix(id)?.apply(Point::ZERO))
    }

    /// Whether a canvas point falls within the transformed box of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::ElementNotFound`].
    pub fn contains_point(&self, id: ElementId, point: Point) -> SceneResult<bool> {
        Ok(self.corners(id)?.contains(point))
    }

    /// Map a canvas point into the centered box space of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NonInvertible`] if the entity (or an ancestor)
    /// is flattened to zero area, or [`SceneError::ElementNotFound`].
    pub fn to_local_point(&self, id: ElementId, point: Point) -> SceneResult<Point> {
        Ok(invert(&self.full_matrix(id)?)?.apply(point))
    }

    /// The front-most visible leaf under a canvas point.
    ///
    /// Roots and group children are searched front-most first; a group's
    /// clip path excludes points outside it.
    #[must_use]
    pub fn entity_at(&self, point: Point) -> Option<ElementId> {
        self.roots
            .iter()
            .rev()
            .find_map(|id| self.hit(*id, point))
    }

    fn hit(&self, id: ElementId, point: Point) -> Option<ElementId> {
        let entity = self.entities.get(&id)?;
        if !entity.style.visible {
            return None;
        }
        let full = self.full_matrix(id).ok()?;
        if let Some(clip) = entity.clip_path() {
            let clip_matrix = if clip.absolute_positioned {
                clip.local_matrix()
            } else {
                multiply(&full, &clip.local_matrix())
            };
            if !clip.contains_point_under(&clip_matrix, point) {
                return None;
            }
        }
        match entity.as_group() {
            Some(group) => group.front_to_back().find_map(|c| self.hit(*c, point)),
            None => entity.contains_point_under(&full, point).then_some(id),
        }
    }

    /// Visit the children of `group` front-most first until `visitor`
    /// breaks.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NotAGroup`] or [`SceneError::ElementNotFound`].
    pub fn for_each_child<F>(&self, group: ElementId, mut visitor: F) -> SceneResult<()>
    where
        F: FnMut(&Entity) -> ControlFlow<()>,
    {
        for child in self.group(group)?.front_to_back() {
            if visitor(self.entity(*child)?).is_break() {
                break;
            }
        }
        Ok(())
    }
}
