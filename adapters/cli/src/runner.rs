//! Tick loop wiring the grid, placement, preview and registry for a stage script.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::Rc,
    time::Duration,
};

use bastion_core::{
    Blueprint, BlueprintId, CellCategory, EntityId, Facing, GridPosition, GridQuery, Mortal,
    PreviewEvent,
};
use bastion_grid::Grid;
use bastion_input::PointerCursor;
use bastion_system_placement::PlacementService;
use bastion_system_preview::{PreviewCoordinator, SpawnState};
use bastion_system_registry::{
    CoreRegistry, CoreRegistryService, RegistrySlot, StageMonitor, StageOutcome,
};
use glam::Vec2;

use crate::stage::{Action, StageError, StageFile, Step};

/// Core entity declared by the stage script.
#[derive(Debug)]
struct StageCore {
    id: EntityId,
    active: Cell<bool>,
    dead: Cell<bool>,
}

impl Mortal for StageCore {
    fn id(&self) -> EntityId {
        self.id
    }

    fn is_dead(&self) -> bool {
        self.dead.get()
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Everything a stage needs, built from its script.
pub(crate) struct StageRunner {
    grid: Rc<Grid>,
    cursor: Rc<PointerCursor>,
    service: PlacementService,
    coordinator: Rc<RefCell<PreviewCoordinator>>,
    slot: RegistrySlot,
    registry: Rc<RefCell<CoreRegistry>>,
    monitor: StageMonitor,
    blueprints: HashMap<BlueprintId, Rc<Blueprint>>,
    cores: Vec<Rc<StageCore>>,
    steps: Vec<Step>,
    bind_tick: u32,
    start_tick: u32,
    frame: Duration,
    preview_events: Rc<RefCell<Vec<PreviewEvent>>>,
}

impl StageRunner {
    /// Builds the stage and wires every subscription.
    pub(crate) fn new(stage: StageFile) -> Result<Self, StageError> {
        let grid = Rc::new(Grid::with_obstacles(stage.grid, &stage.obstacle_cells())?);
        let cursor = Rc::new(PointerCursor::new(stage.camera));
        let mut service = PlacementService::new(grid.clone(), cursor.clone());
        let coordinator = Rc::new(RefCell::new(PreviewCoordinator::new(
            stage.preview,
            grid.clone(),
            grid.clone(),
            cursor.clone(),
        )));
        let _ = PreviewCoordinator::connect(&coordinator, &mut service);

        let preview_events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&preview_events);
        let _ = coordinator
            .borrow_mut()
            .subscribe(move |event| sink.borrow_mut().push(event.clone()));

        let blueprints = stage
            .blueprints
            .iter()
            .map(|entry| {
                let blueprint = entry.to_blueprint();
                (blueprint.id(), Rc::new(blueprint))
            })
            .collect();
        let cores = stage
            .cores
            .iter()
            .map(|entry| {
                Rc::new(StageCore {
                    id: EntityId::new(entry.id),
                    active: Cell::new(entry.active),
                    dead: Cell::new(false),
                })
            })
            .collect();

        let slot = RegistrySlot::new();
        let mut steps = stage.steps;
        steps.sort_by_key(|step| step.tick);

        Ok(Self {
            grid,
            cursor,
            service,
            coordinator,
            monitor: StageMonitor::new(slot.clone()),
            slot,
            registry: Rc::new(RefCell::new(CoreRegistry::new())),
            blueprints,
            cores,
            steps,
            bind_tick: stage.registry.bind_tick,
            start_tick: stage.registry.start_tick,
            frame: Duration::from_millis(stage.frame_ms),
            preview_events,
        })
    }

    /// Replaces the frame length.
    pub(crate) fn set_frame(&mut self, frame: Duration) {
        self.frame = frame;
    }

    /// Runs up to `ticks` ticks, stopping early when the stage fails.
    pub(crate) fn run(mut self, ticks: u32) -> StageReport {
        let mut failure = None;
        let mut next_step = 0;
        let mut ticks_run = 0;

        for tick in 0..ticks {
            ticks_run = tick + 1;
            if tick == self.bind_tick {
                let _ = self.slot.bind(Rc::clone(&self.registry));
            }
            if tick == self.start_tick {
                let scene = self.cores.iter().map(|core| Rc::clone(core) as Rc<dyn Mortal>);
                let _ = self.registry.borrow_mut().start(scene);
            }

            while let Some(step) = self.steps.get(next_step).filter(|step| step.tick == tick) {
                let action = step.action.clone();
                next_step += 1;
                self.apply(tick, &action);
            }

            self.coordinator.borrow_mut().update(self.frame);

            if let Some(outcome) = self.monitor.tick() {
                failure = Some((tick, outcome));
                break;
            }
        }

        if next_step < self.steps.len() {
            tracing::warn!(
                skipped = self.steps.len() - next_step,
                "steps scheduled after the last tick were not applied",
            );
        }
        self.report(ticks_run, failure)
    }

    fn apply(&mut self, tick: u32, action: &Action) {
        tracing::debug!(tick, ?action, "applying step");
        match *action {
            Action::Point { cell } => {
                let cell = GridPosition::from(cell);
                if !self.cursor.move_over(self.grid.grid_to_world(cell)) {
                    tracing::warn!(tick, %cell, "cell is not visible to the camera");
                }
            }
            Action::Pointer { x, y } => self.cursor.move_to(Vec2::new(x, y)),
            Action::Leave => self.cursor.leave(),
            Action::Select { blueprint } => {
                let blueprint = self.blueprints.get(&BlueprintId::new(blueprint)).cloned();
                self.service.change_selection(blueprint, true);
            }
            Action::Cancel => self.service.change_selection(None, true),
            Action::Rotate => self.service.rotate_selection(),
            Action::Place => {
                if !self.service.try_place() {
                    tracing::info!(tick, pivot = %self.service.cursor_pivot(), "placement rejected");
                }
            }
            Action::KillCore { core } => {
                if let Some(core) = self.core(core) {
                    core.dead.set(true);
                    self.registry.borrow_mut().core_died(core.id);
                }
            }
            Action::ActivateCore { core } => {
                if let Some(core) = self.core(core) {
                    core.active.set(true);
                    let _ = self.slot.register(core);
                }
            }
            Action::DestroyEntity { entity } => {
                let entity = EntityId::new(entity);
                let placed = self.coordinator.borrow_mut().entity_destroyed(entity);
                let core = self.registry.borrow_mut().entity_destroyed(entity);
                if !placed && !core {
                    tracing::warn!(tick, entity = entity.get(), "destroyed entity is unknown");
                }
            }
        }
    }

    fn core(&self, id: u32) -> Option<Rc<StageCore>> {
        let id = EntityId::new(id);
        self.cores.iter().find(|core| core.id == id).cloned()
    }

    fn report(&self, ticks_run: u32, failure: Option<(u32, StageOutcome)>) -> StageReport {
        let coordinator = self.coordinator.borrow();
        let placed = coordinator
            .placed_entities()
            .map(|entity| PlacedSummary {
                id: entity.id(),
                blueprint: entity.blueprint().name().to_owned(),
                pivot: entity.pivot(),
                facing: entity.facing(),
                state: entity.state(),
                cells: self.grid.cells_owned_by(entity.id()),
            })
            .collect();
        let registry = self.registry.borrow();

        StageReport {
            ticks_run,
            placed,
            reserved_cells: self.grid.cells_with_category(CellCategory::Reserved).len(),
            registry_ready: registry.is_ready(),
            cores: registry.len(),
            cancelled_settles: self
                .preview_events
                .borrow()
                .iter()
                .filter(|event| matches!(event, PreviewEvent::SettleCancelled { .. }))
                .count(),
            failure,
        }
    }
}

impl fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRunner")
            .field("service", &self.service)
            .field("slot", &self.slot)
            .field("steps", &self.steps.len())
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

/// Placed entity as reported at the end of a run.
#[derive(Clone, Debug)]
pub(crate) struct PlacedSummary {
    pub(crate) id: EntityId,
    pub(crate) blueprint: String,
    pub(crate) pivot: GridPosition,
    pub(crate) facing: Facing,
    pub(crate) state: SpawnState,
    pub(crate) cells: Vec<GridPosition>,
}

/// Outcome of a stage run.
#[derive(Clone, Debug)]
pub(crate) struct StageReport {
    pub(crate) ticks_run: u32,
    pub(crate) placed: Vec<PlacedSummary>,
    pub(crate) reserved_cells: usize,
    pub(crate) registry_ready: bool,
    pub(crate) cores: usize,
    pub(crate) cancelled_settles: usize,
    pub(crate) failure: Option<(u32, StageOutcome)>,
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ticks run: {}", self.ticks_run)?;
        writeln!(
            f,
            "placed entities: {} ({} reserved cells, {} settle sequences cancelled)",
            self.placed.len(),
            self.reserved_cells,
            self.cancelled_settles,
        )?;
        for entity in &self.placed {
            let cells: Vec<String> = entity.cells.iter().map(ToString::to_string).collect();
            writeln!(
                f,
                "  #{} {} at {} facing {:?} [{:?}]: {}",
                entity.id.get(),
                entity.blueprint,
                entity.pivot,
                entity.facing,
                entity.state,
                cells.join(" "),
            )?;
        }
        writeln!(
            f,
            "core registry: {} with {} cores",
            if self.registry_ready { "ready" } else { "not ready" },
            self.cores,
        )?;
        match self.failure {
            Some((tick, StageOutcome::Failed { cores })) => {
                write!(f, "stage failed at tick {tick}: all {cores} cores dead")
            }
            None => write!(f, "stage running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAGE: &str = r#"
        ticks = 60

        [grid]
        columns = 8
        rows = 8
        cell_size = 1.0

        [camera]
        viewport = [800.0, 800.0]
        world_per_pixel = 0.02
        focus = [4.0, 0.0, 4.0]

        [registry]
        bind_tick = 1
        start_tick = 2

        [[blueprints]]
        id = 1
        name = "wall"
        cells = [[0, 0], [1, 0]]

        [[cores]]
        id = 1

        [[cores]]
        id = 2

        [[steps]]
        tick = 0
        action = { kind = "point", cell = [3, 3] }

        [[steps]]
        tick = 0
        action = { kind = "select", blueprint = 1 }

        [[steps]]
        tick = 1
        action = { kind = "place" }

        [[steps]]
        tick = 2
        action = { kind = "select", blueprint = 1 }

        [[steps]]
        tick = 2
        action = { kind = "point", cell = [4, 3] }

        [[steps]]
        tick = 3
        action = { kind = "place" }
    "#;

    fn runner(source: &str) -> StageRunner {
        StageRunner::new(StageFile::parse(source).expect("valid stage")).expect("valid grid")
    }

    #[test]
    fn placements_reserve_cells_and_settle() {
        let report = runner(STAGE).run(60);

        assert_eq!(report.ticks_run, 60);
        assert_eq!(report.placed.len(), 1, "second placement overlaps");
        let placed = &report.placed[0];
        assert_eq!(
            placed.cells,
            vec![GridPosition::new(3, 3), GridPosition::new(4, 3)]
        );
        assert_eq!(placed.state, SpawnState::Spawned);
        assert_eq!(report.reserved_cells, 2);
        assert!(report.registry_ready);
        assert_eq!(report.cores, 2);
        assert!(report.failure.is_none());
    }

    #[test]
    fn killing_every_core_ends_the_run() {
        let source = format!(
            "{STAGE}
            [[steps]]
            tick = 5
            action = {{ kind = \"kill_core\", core = 1 }}

            [[steps]]
            tick = 7
            action = {{ kind = \"kill_core\", core = 2 }}
            "
        );

        let report = runner(&source).run(60);

        assert_eq!(
            report.failure,
            Some((7, StageOutcome::Failed { cores: 2 }))
        );
        assert_eq!(report.ticks_run, 8);
        assert!(report.to_string().contains("stage failed at tick 7"));
    }

    #[test]
    fn inactive_cores_join_only_when_activated() {
        let mut stage = runner(
            r#"
            [registry]
            bind_tick = 3
            start_tick = 0

            [[cores]]
            id = 1
            active = false

            [[steps]]
            tick = 1
            action = { kind = "activate_core", core = 1 }
            "#,
        );
        stage.set_frame(Duration::from_millis(10));

        let report = stage.run(5);

        assert!(report.registry_ready);
        assert_eq!(report.cores, 0, "activation before binding hits the placeholder");
    }

    #[test]
    fn invalid_obstacles_surface_as_stage_errors() {
        let stage = StageFile::parse("obstacles = [[20, 20]]").expect("parses");

        assert!(matches!(
            StageRunner::new(stage),
            Err(StageError::Grid(_))
        ));
    }
}
