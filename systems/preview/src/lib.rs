#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Preview coordinator that visualises the selection and commits placements.
//!
//! The coordinator listens to [`PlacementEvent`] notifications. It keeps a
//! transient preview following the cursor, and when a placement is confirmed
//! it writes the reservation through [`GridMutation`] before any cosmetic
//! work starts. It is the only component handed the mutation surface.

mod settle;

use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc, time::Duration};

use bastion_core::{
    Blueprint, CellCategory, Cursor, EntityId, Facing, GridMutation, GridPosition, GridQuery,
    Notifier, PlacementEvent, PreviewEvent, SubscriptionId,
};
use bastion_system_placement::PlacementService;
use glam::{Quat, Vec3};
use serde::Deserialize;

use settle::{SettleTask, SettleTiming};

/// Tuning parameters for preview motion and the settle sequence.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Height above the resting position at which the preview floats.
    pub hover_height: f32,
    /// Exponential smoothing rate (per second) of the preview position.
    pub follow_sharpness: f32,
    /// Exponential smoothing rate (per second) of the preview rotation.
    pub rotation_sharpness: f32,
    /// Extra height the entity rises to before dropping into place.
    pub rise_height: f32,
    /// Duration of the rise phase in seconds.
    pub rise_secs: f32,
    /// Duration of the drop phase in seconds.
    pub drop_secs: f32,
    /// Final offset above the blueprint's resting height.
    pub rest_offset: f32,
    /// Identifier handed to the first placed entity.
    pub first_entity_id: u32,
}

impl PreviewConfig {
    fn settle_timing(&self) -> SettleTiming {
        SettleTiming {
            rise: seconds(self.rise_secs),
            drop: seconds(self.drop_secs),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            hover_height: 0.35,
            follow_sharpness: 18.0,
            rotation_sharpness: 14.0,
            rise_height: 0.5,
            rise_secs: 0.12,
            drop_secs: 0.18,
            rest_offset: 0.0,
            first_entity_id: 1_000,
        }
    }
}

fn seconds(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(Duration::ZERO)
}

/// Returns the interpolation factor for exponential smoothing over `dt`.
#[must_use]
pub fn smoothing_factor(sharpness: f32, dt: Duration) -> f32 {
    if sharpness <= 0.0 {
        return 0.0;
    }
    (1.0 - (-sharpness * dt.as_secs_f32()).exp()).clamp(0.0, 1.0)
}

/// Render layer a scene node is drawn on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderLayer {
    /// Regular scene content.
    Default,
    /// Ghost layer used while previewing; excluded from picking and physics.
    Preview,
}

/// Presentation state of a preview or placed entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneNode {
    /// World position.
    pub position: Vec3,
    /// World rotation.
    pub rotation: Quat,
    /// Layer the node renders on.
    pub layer: RenderLayer,
    /// Whether the node takes part in collisions.
    pub colliding: bool,
    /// Whether the node is parented to the cursor.
    pub attached_to_cursor: bool,
}

/// Transient ghost following the cursor while a blueprint is selected.
#[derive(Clone, Debug)]
pub struct PreviewInstance {
    blueprint: Rc<Blueprint>,
    facing: Facing,
    node: SceneNode,
    restore_layer: RenderLayer,
}

impl PreviewInstance {
    /// Blueprint being previewed.
    #[must_use]
    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    /// Facing the preview is turning towards.
    #[must_use]
    pub const fn facing(&self) -> Facing {
        self.facing
    }

    /// Presentation state of the preview.
    #[must_use]
    pub const fn node(&self) -> &SceneNode {
        &self.node
    }
}

/// Spawn progress of a placed entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpawnState {
    /// The settle sequence is still playing.
    Settling,
    /// The entity is fully spawned.
    Spawned,
}

/// Entity created by a committed placement.
#[derive(Clone, Debug)]
pub struct PlacedEntity {
    id: EntityId,
    blueprint: Rc<Blueprint>,
    facing: Facing,
    pivot: GridPosition,
    node: SceneNode,
    state: SpawnState,
}

impl PlacedEntity {
    /// Identifier owning the reserved cells.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Blueprint the entity was built from.
    #[must_use]
    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    /// Facing the entity was placed with.
    #[must_use]
    pub const fn facing(&self) -> Facing {
        self.facing
    }

    /// Pivot cell the entity was placed at.
    #[must_use]
    pub const fn pivot(&self) -> GridPosition {
        self.pivot
    }

    /// Presentation state of the entity.
    #[must_use]
    pub const fn node(&self) -> &SceneNode {
        &self.node
    }

    /// Spawn progress of the entity.
    #[must_use]
    pub const fn state(&self) -> SpawnState {
        self.state
    }

    /// Reports whether the settle sequence finished.
    #[must_use]
    pub fn is_spawned(&self) -> bool {
        self.state == SpawnState::Spawned
    }

    /// Marks the spawn sequence complete.
    pub fn mark_spawned(&mut self) {
        self.state = SpawnState::Spawned;
    }
}

#[derive(Clone, Debug)]
struct ActiveSelection {
    blueprint: Rc<Blueprint>,
    facing: Facing,
}

/// Owns the preview instance and performs the grid write on confirmation.
pub struct PreviewCoordinator {
    config: PreviewConfig,
    grid: Rc<dyn GridQuery>,
    mutation: Rc<dyn GridMutation>,
    cursor: Rc<dyn Cursor>,
    selection: Option<ActiveSelection>,
    preview: Option<PreviewInstance>,
    placed: BTreeMap<EntityId, PlacedEntity>,
    settling: Vec<SettleTask>,
    next_entity: EntityId,
    events: Notifier<PreviewEvent>,
}

impl PreviewCoordinator {
    /// Creates a coordinator with no preview.
    #[must_use]
    pub fn new(
        config: PreviewConfig,
        grid: Rc<dyn GridQuery>,
        mutation: Rc<dyn GridMutation>,
        cursor: Rc<dyn Cursor>,
    ) -> Self {
        Self {
            next_entity: EntityId::new(config.first_entity_id),
            config,
            grid,
            mutation,
            cursor,
            selection: None,
            preview: None,
            placed: BTreeMap::new(),
            settling: Vec::new(),
            events: Notifier::new(),
        }
    }

    /// Subscribes a shared coordinator to the service's notifications.
    ///
    /// The subscription holds a weak reference, so dropping the coordinator
    /// silently ends delivery.
    pub fn connect(coordinator: &Rc<RefCell<Self>>, service: &mut PlacementService) -> SubscriptionId {
        let weak = Rc::downgrade(coordinator);
        service.subscribe(move |event| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.borrow_mut().handle(event);
            }
        })
    }

    /// Registers a listener for placed-entity notifications.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&PreviewEvent) + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Current preview, if one is shown.
    #[must_use]
    pub fn preview(&self) -> Option<&PreviewInstance> {
        self.preview.as_ref()
    }

    /// Placed entity with the provided id.
    #[must_use]
    pub fn placed(&self, entity: EntityId) -> Option<&PlacedEntity> {
        self.placed.get(&entity)
    }

    /// Placed entities in id order.
    pub fn placed_entities(&self) -> impl Iterator<Item = &PlacedEntity> {
        self.placed.values()
    }

    /// Reports whether the entity's settle sequence is still running.
    #[must_use]
    pub fn is_settling(&self, entity: EntityId) -> bool {
        self.settling.iter().any(|task| task.entity() == entity)
    }

    /// Reacts to a placement notification.
    pub fn handle(&mut self, event: &PlacementEvent) {
        match event {
            PlacementEvent::SelectionChanged { selection } => {
                self.selection = Some(ActiveSelection {
                    blueprint: Rc::clone(&selection.blueprint),
                    facing: selection.facing,
                });
                self.rebuild_preview();
            }
            PlacementEvent::Cancelled => {
                self.selection = None;
                self.rebuild_preview();
            }
            PlacementEvent::Rotated { facing, .. } => {
                if let Some(selection) = self.selection.as_mut() {
                    selection.facing = *facing;
                }
                if let Some(preview) = self.preview.as_mut() {
                    preview.facing = *facing;
                }
            }
            PlacementEvent::Placed { pivot } => self.commit(*pivot),
        }
    }

    /// Advances preview motion and settle sequences by one frame.
    pub fn update(&mut self, dt: Duration) {
        self.follow_cursor(dt);
        self.advance_settling(dt);
    }

    /// Forgets a destroyed entity, cancelling its settle sequence.
    ///
    /// The grid reservation stays committed. Returns `false` for unknown ids.
    pub fn entity_destroyed(&mut self, entity: EntityId) -> bool {
        let known = self.placed.remove(&entity).is_some();
        let before = self.settling.len();
        self.settling.retain(|task| task.entity() != entity);
        if self.settling.len() != before {
            tracing::debug!(entity = entity.get(), "settle sequence cancelled");
            self.events
                .publish(&PreviewEvent::SettleCancelled { entity });
        }
        known
    }

    fn rebuild_preview(&mut self) {
        self.destroy_preview();
        let cell = self.cursor.grid_position(self.grid.as_ref());
        if self.grid.is_valid_position(cell) {
            self.spawn_preview(cell);
        }
    }

    fn destroy_preview(&mut self) {
        if let Some(mut preview) = self.preview.take() {
            preview.node.layer = preview.restore_layer;
            tracing::trace!(blueprint = preview.blueprint.name(), "preview destroyed");
        }
    }

    fn spawn_preview(&mut self, cell: GridPosition) {
        let Some(selection) = self.selection.as_ref() else {
            return;
        };

        let node = SceneNode {
            position: self.hover_target(cell, &selection.blueprint),
            rotation: selection.facing.rotation(),
            layer: RenderLayer::Preview,
            colliding: false,
            attached_to_cursor: true,
        };
        tracing::trace!(blueprint = selection.blueprint.name(), %cell, "preview spawned");
        self.preview = Some(PreviewInstance {
            blueprint: Rc::clone(&selection.blueprint),
            facing: selection.facing,
            node,
            restore_layer: RenderLayer::Default,
        });
    }

    fn hover_target(&self, cell: GridPosition, blueprint: &Blueprint) -> Vec3 {
        self.grid.grid_to_world(cell)
            + Vec3::Y * (blueprint.vertical_offset() + self.config.hover_height)
    }

    fn follow_cursor(&mut self, dt: Duration) {
        if self.selection.is_none() {
            return;
        }

        let cell = self.cursor.grid_position(self.grid.as_ref());
        if !self.grid.is_valid_position(cell) {
            self.destroy_preview();
            return;
        }

        let Some(preview) = self.preview.as_ref() else {
            self.spawn_preview(cell);
            return;
        };

        let target = self.hover_target(cell, &preview.blueprint);
        let follow = smoothing_factor(self.config.follow_sharpness, dt);
        let turn = smoothing_factor(self.config.rotation_sharpness, dt);
        if let Some(preview) = self.preview.as_mut() {
            let node = &mut preview.node;
            node.position = node.position.lerp(target, follow);
            node.rotation = node.rotation.slerp(preview.facing.rotation(), turn);
        }
    }

    fn commit(&mut self, pivot: GridPosition) {
        if self.preview.is_none() && self.grid.is_valid_position(pivot) {
            self.spawn_preview(pivot);
            if self.preview.is_some() {
                tracing::warn!(%pivot, "preview was hidden at confirmation; rebuilt at the pivot");
            }
        }
        self.selection = None;

        let Some(preview) = self.preview.take() else {
            tracing::error!(%pivot, "placement confirmed without an active preview; ignoring");
            return;
        };

        let entity = self.next_entity;
        self.next_entity = entity.next();

        let footprint = preview.blueprint.footprint(pivot, preview.facing);
        self.mutation
            .set_category(footprint.cells(), CellCategory::Reserved, Some(entity));

        let PreviewInstance {
            blueprint,
            facing,
            mut node,
            restore_layer,
        } = preview;
        node.attached_to_cursor = false;
        node.layer = restore_layer;
        node.colliding = true;
        node.rotation = facing.rotation();

        let rest = self.grid.grid_to_world(pivot)
            + Vec3::Y * (blueprint.vertical_offset() + self.config.rest_offset);
        self.settling.push(SettleTask::new(
            entity,
            node.position,
            rest,
            self.config.rise_height,
        ));
        tracing::debug!(
            entity = entity.get(),
            blueprint = blueprint.name(),
            %pivot,
            cells = footprint.len(),
            "reservation committed",
        );
        let _ = self.placed.insert(
            entity,
            PlacedEntity {
                id: entity,
                blueprint,
                facing,
                pivot,
                node,
                state: SpawnState::Settling,
            },
        );
        self.events.publish(&PreviewEvent::Reserved { entity, pivot });
    }

    fn advance_settling(&mut self, dt: Duration) {
        if self.settling.is_empty() {
            return;
        }

        let timing = self.config.settle_timing();
        let mut finished = Vec::new();
        for task in &mut self.settling {
            let (position, done) = task.advance(dt, timing);
            if let Some(placed) = self.placed.get_mut(&task.entity()) {
                placed.node.position = position;
            }
            if done {
                finished.push(task.entity());
            }
        }

        if finished.is_empty() {
            return;
        }
        self.settling.retain(|task| !finished.contains(&task.entity()));
        for entity in finished {
            if let Some(placed) = self.placed.get_mut(&entity) {
                placed.mark_spawned();
            }
            tracing::debug!(entity = entity.get(), "spawn sequence complete");
            self.events.publish(&PreviewEvent::SpawnCompleted { entity });
        }
    }
}

impl fmt::Debug for PreviewCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewCoordinator")
            .field("config", &self.config)
            .field("preview", &self.preview)
            .field("placed", &self.placed.len())
            .field("settling", &self.settling.len())
            .field("next_entity", &self.next_entity)
            .finish_non_exhaustive()
    }
}
