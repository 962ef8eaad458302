#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Placement state machine deciding what is being placed and whether it may land.
//!
//! The service only reads the grid. Committing a reservation is left to
//! whichever subscriber handles [`PlacementEvent::Placed`], so presentation
//! can run between the decision and the commit without this crate knowing.

use std::{fmt, rc::Rc};

use bastion_core::{
    Blueprint, CellCategory, ChangeKind, Cursor, Facing, Footprint, GridPosition, GridQuery,
    Notifier, PlacementEvent, PlacementSelection, SubscriptionId,
};

/// Selection state machine: idle, or holding a blueprint awaiting confirmation.
pub struct PlacementService {
    grid: Rc<dyn GridQuery>,
    cursor: Rc<dyn Cursor>,
    selection: Option<PlacementSelection>,
    events: Notifier<PlacementEvent>,
}

impl PlacementService {
    /// Creates an idle service reading the grid and cursor it is given.
    #[must_use]
    pub fn new(grid: Rc<dyn GridQuery>, cursor: Rc<dyn Cursor>) -> Self {
        Self {
            grid,
            cursor,
            selection: None,
            events: Notifier::new(),
        }
    }

    /// Registers a listener for placement notifications.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&PlacementEvent) + 'static,
    {
        self.events.subscribe(listener)
    }

    /// Removes a listener registered with [`PlacementService::subscribe`].
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Current selection, if any.
    #[must_use]
    pub fn selection(&self) -> Option<&PlacementSelection> {
        self.selection.as_ref()
    }

    /// Reports whether nothing is selected.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.selection.is_none()
    }

    /// Replaces the current selection.
    ///
    /// Selecting the blueprint that is already selected does nothing.
    /// Passing `None` cancels an active selection.
    pub fn change_selection(&mut self, blueprint: Option<Rc<Blueprint>>, via_discrete_input: bool) {
        let current = self.selection.as_ref().map(|selection| selection.blueprint.id());
        if current == blueprint.as_ref().map(|blueprint| blueprint.id()) {
            return;
        }

        let Some(blueprint) = blueprint else {
            self.selection = None;
            tracing::debug!("selection cancelled");
            self.events.publish(&PlacementEvent::Cancelled);
            return;
        };

        let facing = self
            .selection
            .as_ref()
            .map_or(Facing::North, |selection| selection.facing);
        let change = classify_change(self.selection.as_ref(), &blueprint, facing);
        let selection = PlacementSelection {
            blueprint,
            facing,
            change,
            via_discrete_input,
        };
        tracing::debug!(
            blueprint = selection.blueprint.name(),
            ?facing,
            ?change,
            via_discrete_input,
            "selection changed",
        );
        self.selection = Some(selection.clone());
        self.events
            .publish(&PlacementEvent::SelectionChanged { selection });
    }

    /// Attempts to place the selection at the cell under the cursor.
    ///
    /// Returns `false` without side effects when nothing is selected or any
    /// footprint cell is outside the grid or not walkable. On success the
    /// service returns to idle and publishes [`PlacementEvent::Placed`]
    /// before returning.
    pub fn try_place(&mut self) -> bool {
        let pivot = self.cursor_pivot();
        let legal = match &self.selection {
            None => return false,
            Some(selection) => self.footprint_is_free(&selection.footprint(pivot)),
        };
        if !legal {
            tracing::trace!(%pivot, "placement rejected");
            return false;
        }

        let placed = self.selection.take();
        tracing::debug!(
            blueprint = placed.as_ref().map(|placed| placed.blueprint.name()),
            facing = ?placed.as_ref().map(|placed| placed.facing),
            %pivot,
            "placement confirmed",
        );
        self.events.publish(&PlacementEvent::Placed { pivot });
        true
    }

    /// Turns the selection one quarter clockwise. Does nothing when idle.
    pub fn rotate_selection(&mut self) {
        let Some(selection) = self.selection.as_mut() else {
            return;
        };

        selection.facing = selection.facing.next();
        selection.change = if selection.blueprint.is_rotation_symmetric() {
            ChangeKind::None
        } else {
            ChangeKind::XzOffset
        };
        let event = PlacementEvent::Rotated {
            facing: selection.facing,
            change: selection.change,
        };
        tracing::debug!(facing = ?selection.facing, "selection rotated");
        self.events.publish(&event);
    }

    /// Cell currently under the cursor.
    #[must_use]
    pub fn cursor_pivot(&self) -> GridPosition {
        self.cursor.grid_position(self.grid.as_ref())
    }

    /// Reports whether the selection could be placed with its pivot at `pivot`.
    #[must_use]
    pub fn can_place_at(&self, pivot: GridPosition) -> bool {
        self.selection
            .as_ref()
            .is_some_and(|selection| self.footprint_is_free(&selection.footprint(pivot)))
    }

    fn footprint_is_free(&self, footprint: &Footprint) -> bool {
        footprint.iter().all(|cell| {
            self.grid.is_valid_position(*cell)
                && self.grid.has_category(*cell, CellCategory::Walkable)
        })
    }
}

impl fmt::Debug for PlacementService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlacementService")
            .field("selection", &self.selection)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Classifies how far the visuals moved when switching to `next` at `facing`.
#[must_use]
pub fn classify_change(
    previous: Option<&PlacementSelection>,
    next: &Blueprint,
    facing: Facing,
) -> ChangeKind {
    let Some(previous) = previous else {
        return ChangeKind::All;
    };

    if (previous.blueprint.vertical_offset() - next.vertical_offset()).abs() > f32::EPSILON {
        return ChangeKind::All;
    }

    let before = previous.footprint(GridPosition::ORIGIN);
    let after = next.footprint(GridPosition::ORIGIN, facing);
    if before == after {
        ChangeKind::None
    } else {
        ChangeKind::XzOffset
    }
}
