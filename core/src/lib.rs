#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Bastion placement stack.
//!
//! This crate defines the vocabulary that connects the authoritative grid,
//! the pure placement systems, and adapters. The grid is reached exclusively
//! through the [`GridQuery`] and [`GridMutation`] capabilities, pointer input
//! through [`Cursor`], and registry members through [`Mortal`]. Systems talk
//! to each other by publishing [`PlacementEvent`] and [`PreviewEvent`] values
//! on [`Notifier`] channels, which deliver synchronously and in subscription
//! order on the single simulation thread.

mod channel;

use std::{f32::consts::FRAC_PI_2, fmt, rc::Rc};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

pub use channel::{Notifier, OneShot, OneShotSubscription, SubscriptionId};

/// Unique identifier assigned to a live entity (placed objects, cores).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Identifier that follows this one in allocation order.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Identifier of a placeable blueprint (the prototype a player selects).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlueprintId(u32);

impl BlueprintId {
    /// Creates a new blueprint identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Location of a single grid cell. Grid `y` runs along world `z`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    x: i32,
    y: i32,
}

impl GridPosition {
    /// Grid origin.
    pub const ORIGIN: Self = Self::new(0, 0);

    /// Creates a new grid position.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Column of the cell.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.x
    }

    /// Row of the cell.
    #[must_use]
    pub const fn y(&self) -> i32 {
        self.y
    }

    /// Returns the position shifted by `offset`, saturating at the integer bounds.
    #[must_use]
    pub const fn offset_by(self, offset: GridPosition) -> Self {
        Self {
            x: self.x.saturating_add(offset.x),
            y: self.y.saturating_add(offset.y),
        }
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<[i32; 2]> for GridPosition {
    fn from([x, y]: [i32; 2]) -> Self {
        Self::new(x, y)
    }
}

/// Discrete facing of a placeable entity, advanced clockwise by rotate input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    /// Unrotated orientation; blueprint shapes are authored facing north.
    #[default]
    North,
    /// One quarter turn clockwise.
    East,
    /// Half turn.
    South,
    /// Three quarter turns clockwise.
    West,
}

impl Facing {
    /// Every facing in clockwise order starting from north.
    pub const ALL: [Facing; 4] = [Facing::North, Facing::East, Facing::South, Facing::West];

    /// Facing reached after one clockwise quarter turn.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::North => Self::East,
            Self::East => Self::South,
            Self::South => Self::West,
            Self::West => Self::North,
        }
    }

    /// Number of clockwise quarter turns away from north.
    #[must_use]
    pub const fn quarter_turns(self) -> u8 {
        match self {
            Self::North => 0,
            Self::East => 1,
            Self::South => 2,
            Self::West => 3,
        }
    }

    /// Rotates a north-relative cell offset into this facing.
    #[must_use]
    pub const fn rotate(self, offset: GridPosition) -> GridPosition {
        let (x, y) = (offset.x(), offset.y());
        match self {
            Self::North => GridPosition::new(x, y),
            Self::East => GridPosition::new(-y, x),
            Self::South => GridPosition::new(-x, -y),
            Self::West => GridPosition::new(y, -x),
        }
    }

    /// World-space rotation about the vertical axis matching [`Facing::rotate`].
    #[must_use]
    pub fn rotation(self) -> Quat {
        Quat::from_rotation_y(-(self.quarter_turns() as f32) * FRAC_PI_2)
    }
}

/// Category assigned to a grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellCategory {
    /// Open ground that placements may claim.
    Walkable,
    /// Static scenery that can never be claimed.
    Obstacle,
    /// Ground claimed by a placed entity.
    Reserved,
}

/// Ordered cells covered by a blueprint at a particular pivot and facing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Footprint {
    cells: Vec<GridPosition>,
}

impl Footprint {
    /// Creates a footprint from explicit cells.
    #[must_use]
    pub fn new(cells: Vec<GridPosition>) -> Self {
        Self { cells }
    }

    /// Cells composing the footprint in blueprint order.
    #[must_use]
    pub fn cells(&self) -> &[GridPosition] {
        &self.cells
    }

    /// Iterator over the cells composing the footprint.
    pub fn iter(&self) -> impl Iterator<Item = &GridPosition> {
        self.cells.iter()
    }

    /// Number of cells in the footprint.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Reports whether the footprint covers no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Consumes the footprint, yielding the underlying cells.
    #[must_use]
    pub fn into_vec(self) -> Vec<GridPosition> {
        self.cells
    }
}

/// Prototype of a placeable entity.
///
/// `cells` are offsets from the pivot with the blueprint facing north. The
/// pivot itself is only covered when `(0, 0)` is listed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    id: BlueprintId,
    name: String,
    cells: Vec<GridPosition>,
    #[serde(default)]
    vertical_offset: f32,
    #[serde(default)]
    rotation_symmetric: bool,
}

impl Blueprint {
    /// Creates a blueprint covering `cells` with no vertical offset.
    #[must_use]
    pub fn new(id: BlueprintId, name: impl Into<String>, cells: Vec<GridPosition>) -> Self {
        Self {
            id,
            name: name.into(),
            cells,
            vertical_offset: 0.0,
            rotation_symmetric: false,
        }
    }

    /// Sets the height above the cell centre at which the entity rests.
    #[must_use]
    pub fn with_vertical_offset(mut self, vertical_offset: f32) -> Self {
        self.vertical_offset = vertical_offset;
        self
    }

    /// Marks whether rotating the blueprint leaves its appearance unchanged.
    #[must_use]
    pub fn with_rotation_symmetry(mut self, rotation_symmetric: bool) -> Self {
        self.rotation_symmetric = rotation_symmetric;
        self
    }

    /// Identifier of the blueprint.
    #[must_use]
    pub const fn id(&self) -> BlueprintId {
        self.id
    }

    /// Human readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Height above the cell centre at which the entity rests.
    #[must_use]
    pub const fn vertical_offset(&self) -> f32 {
        self.vertical_offset
    }

    /// Reports whether every facing looks the same.
    #[must_use]
    pub const fn is_rotation_symmetric(&self) -> bool {
        self.rotation_symmetric
    }

    /// Computes the cells covered when the pivot sits at `pivot` with `facing`.
    #[must_use]
    pub fn footprint(&self, pivot: GridPosition, facing: Facing) -> Footprint {
        Footprint::new(
            self.cells
                .iter()
                .map(|offset| pivot.offset_by(facing.rotate(*offset)))
                .collect(),
        )
    }
}

/// Describes how much a selection change moved the dependent visuals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Footprint and vertical offset are unchanged; nothing to refresh.
    None,
    /// Only the horizontal footprint changed; a reposition suffices.
    XzOffset,
    /// The vertical offset changed as well; a full refresh is required.
    All,
}

/// Blueprint currently chosen for placement together with its facing.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementSelection {
    /// Prototype selected for placement.
    pub blueprint: Rc<Blueprint>,
    /// Facing the entity will be placed with.
    pub facing: Facing,
    /// Classification of the change relative to the previous selection.
    pub change: ChangeKind,
    /// Whether the selection came from a discrete input such as a hotkey.
    pub via_discrete_input: bool,
}

impl PlacementSelection {
    /// Footprint covered by the selection at the provided pivot.
    #[must_use]
    pub fn footprint(&self, pivot: GridPosition) -> Footprint {
        self.blueprint.footprint(pivot, self.facing)
    }
}

/// Notifications published by the placement service.
#[derive(Clone, Debug, PartialEq)]
pub enum PlacementEvent {
    /// A new blueprint was selected.
    SelectionChanged {
        /// Selection that became active.
        selection: PlacementSelection,
    },
    /// The active selection was dropped without placing.
    Cancelled,
    /// The active selection turned to a new facing.
    Rotated {
        /// Facing after the turn.
        facing: Facing,
        /// Classification of the visual change caused by the turn.
        change: ChangeKind,
    },
    /// The active selection was confirmed at a legal pivot.
    Placed {
        /// Pivot cell under the cursor at the instant of confirmation.
        pivot: GridPosition,
    },
}

/// Notifications published by the preview coordinator about placed entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewEvent {
    /// The grid reservation for a freshly placed entity was committed.
    Reserved {
        /// Entity that owns the reserved cells.
        entity: EntityId,
        /// Pivot the entity was placed at.
        pivot: GridPosition,
    },
    /// The settle sequence finished and the entity is fully spawned.
    SpawnCompleted {
        /// Entity that finished spawning.
        entity: EntityId,
    },
    /// The entity was destroyed before its settle sequence finished.
    SettleCancelled {
        /// Entity whose settle sequence was dropped.
        entity: EntityId,
    },
}

/// Read-only spatial queries against the placement grid.
pub trait GridQuery {
    /// Reports whether the position lies inside the grid.
    fn is_valid_position(&self, position: GridPosition) -> bool;

    /// Category of the cell, or `None` outside the grid.
    fn category(&self, position: GridPosition) -> Option<CellCategory>;

    /// Entity that owns the cell, if any.
    fn owner(&self, position: GridPosition) -> Option<EntityId>;

    /// Converts a world position into the cell that contains it.
    ///
    /// The result may lie outside the grid; check it with
    /// [`GridQuery::is_valid_position`].
    fn snap_world_to_grid(&self, world: Vec3) -> GridPosition;

    /// World position of the centre of the provided cell.
    fn grid_to_world(&self, position: GridPosition) -> Vec3;

    /// Reports whether the cell currently carries `category`.
    fn has_category(&self, position: GridPosition, category: CellCategory) -> bool {
        self.category(position) == Some(category)
    }
}

/// Write access to the placement grid.
pub trait GridMutation {
    /// Overwrites category and owner of every listed cell.
    fn set_category(
        &self,
        positions: &[GridPosition],
        category: CellCategory,
        owner: Option<EntityId>,
    );
}

/// Pointer-driven world cursor.
pub trait Cursor {
    /// Raw world position under the pointer.
    fn world_position(&self) -> Vec3;

    /// Cell under the pointer.
    fn grid_position(&self, grid: &dyn GridQuery) -> GridPosition {
        grid.snap_world_to_grid(self.world_position())
    }

    /// World position of the centre of the cell under the pointer.
    fn snapped_world_position(&self, grid: &dyn GridQuery) -> Vec3 {
        grid.grid_to_world(self.grid_position(grid))
    }
}

/// Capability of entities that can die, consumed by the core registry.
pub trait Mortal {
    /// Identity used for de-duplication.
    fn id(&self) -> EntityId;

    /// Reports whether the entity has died.
    fn is_dead(&self) -> bool;

    /// Reports whether the entity is active in the scene.
    fn is_active(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{Blueprint, BlueprintId, CellCategory, EntityId, Facing, GridPosition};
    use glam::Vec3;
    use serde::{de::DeserializeOwned, Serialize};

    fn assert_round_trip<T>(value: &T)
    where
        T: Serialize + DeserializeOwned + PartialEq + std::fmt::Debug,
    {
        let bytes = bincode::serialize(value).expect("serialize");
        let restored: T = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(&restored, value);
    }

    fn bar() -> Blueprint {
        Blueprint::new(
            BlueprintId::new(1),
            "bar",
            vec![GridPosition::new(0, 0), GridPosition::new(1, 0)],
        )
    }

    #[test]
    fn facing_cycles_clockwise() {
        let mut facing = Facing::North;
        let mut visited = Vec::new();
        for _ in 0..4 {
            visited.push(facing);
            facing = facing.next();
        }
        assert_eq!(visited, Facing::ALL.to_vec());
        assert_eq!(facing, Facing::North);
    }

    #[test]
    fn footprint_rotates_around_pivot() {
        let pivot = GridPosition::new(3, 3);
        let cells: Vec<_> = Facing::ALL
            .iter()
            .map(|facing| bar().footprint(pivot, *facing).into_vec())
            .collect();

        assert_eq!(cells[0], vec![pivot, GridPosition::new(4, 3)]);
        assert_eq!(cells[1], vec![pivot, GridPosition::new(3, 4)]);
        assert_eq!(cells[2], vec![pivot, GridPosition::new(2, 3)]);
        assert_eq!(cells[3], vec![pivot, GridPosition::new(3, 2)]);
    }

    #[test]
    fn facing_rotation_matches_cell_rotation() {
        for facing in Facing::ALL {
            let offset = facing.rotate(GridPosition::new(1, 0));
            let rotated = facing.rotation() * Vec3::X;
            assert!(
                (rotated.x - offset.x() as f32).abs() < 1e-5
                    && (rotated.z - offset.y() as f32).abs() < 1e-5,
                "{facing:?} rotated +x to {rotated:?}, cells moved to {offset:?}",
            );
        }
    }

    #[test]
    fn entity_ids_advance_sequentially() {
        assert_eq!(EntityId::new(7).next(), EntityId::new(8));
    }

    #[test]
    fn blueprint_round_trips_through_bincode() {
        assert_round_trip(&bar().with_vertical_offset(0.25));
    }

    #[test]
    fn cell_category_round_trips_through_bincode() {
        assert_round_trip(&CellCategory::Reserved);
    }
}
