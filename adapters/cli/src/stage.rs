//! Stage scripts: grid layout, catalogue, cores and timed inputs loaded from TOML.

use std::collections::HashSet;

use bastion_core::{Blueprint, BlueprintId, GridPosition};
use bastion_grid::{GridConfig, GridError};
use bastion_input::CameraProjection;
use bastion_system_preview::PreviewConfig;
use serde::Deserialize;
use thiserror::Error;

/// Stage bundled with the binary and used when no file is given.
pub(crate) const DEMO_STAGE: &str = include_str!("../stages/demo.toml");

/// Problems found while loading a stage script.
#[derive(Debug, Error)]
pub(crate) enum StageError {
    /// The script is not valid TOML or does not match the stage schema.
    #[error("stage script is malformed: {0}")]
    Parse(#[from] toml::de::Error),
    /// The grid section or obstacle list is unusable.
    #[error("stage grid is invalid: {0}")]
    Grid(#[from] GridError),
    /// Two blueprints share an id.
    #[error("blueprint {id} is declared more than once")]
    DuplicateBlueprint {
        /// Repeated identifier.
        id: u32,
    },
    /// A blueprint covers no cells.
    #[error("blueprint {id} has no cells")]
    EmptyBlueprint {
        /// Offending identifier.
        id: u32,
    },
    /// Two cores share an id.
    #[error("core {id} is declared more than once")]
    DuplicateCore {
        /// Repeated identifier.
        id: u32,
    },
    /// A step names a blueprint the stage does not declare.
    #[error("step at tick {tick} selects unknown blueprint {id}")]
    UnknownBlueprint {
        /// Tick of the step.
        tick: u32,
        /// Missing identifier.
        id: u32,
    },
    /// A step names a core the stage does not declare.
    #[error("step at tick {tick} refers to unknown core {id}")]
    UnknownCore {
        /// Tick of the step.
        tick: u32,
        /// Missing identifier.
        id: u32,
    },
    /// The frame length is zero.
    #[error("frame length must be positive")]
    ZeroFrame,
}

/// Parsed stage script.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StageFile {
    /// Number of ticks to simulate.
    #[serde(default = "default_ticks")]
    pub(crate) ticks: u32,
    /// Simulated frame length in milliseconds.
    #[serde(default = "default_frame_ms")]
    pub(crate) frame_ms: u64,
    /// Cells seeded as obstacles.
    #[serde(default)]
    pub(crate) obstacles: Vec<[i32; 2]>,
    /// Grid dimensions and placement in the world.
    #[serde(default)]
    pub(crate) grid: GridConfig,
    /// Preview motion tuning.
    #[serde(default)]
    pub(crate) preview: PreviewConfig,
    /// Camera used to project the pointer.
    #[serde(default)]
    pub(crate) camera: CameraProjection,
    /// When the registry is bound and swept.
    #[serde(default)]
    pub(crate) registry: RegistrySchedule,
    /// Placeable blueprints.
    #[serde(default)]
    pub(crate) blueprints: Vec<BlueprintEntry>,
    /// Core entities present in the scene.
    #[serde(default)]
    pub(crate) cores: Vec<CoreEntry>,
    /// Scripted inputs.
    #[serde(default)]
    pub(crate) steps: Vec<Step>,
}

const fn default_ticks() -> u32 {
    120
}

const fn default_frame_ms() -> u64 {
    16
}

/// Ticks at which the registry becomes reachable and runs its sweep.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RegistrySchedule {
    /// Tick at which the registry slot is bound.
    pub(crate) bind_tick: u32,
    /// Tick at which the start-up sweep runs.
    pub(crate) start_tick: u32,
}

impl Default for RegistrySchedule {
    fn default() -> Self {
        Self {
            bind_tick: 2,
            start_tick: 4,
        }
    }
}

/// Blueprint declaration; cells are north-facing offsets from the pivot.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct BlueprintEntry {
    pub(crate) id: u32,
    pub(crate) name: String,
    pub(crate) cells: Vec<[i32; 2]>,
    #[serde(default)]
    pub(crate) vertical_offset: f32,
    #[serde(default)]
    pub(crate) rotation_symmetric: bool,
}

impl BlueprintEntry {
    pub(crate) fn to_blueprint(&self) -> Blueprint {
        Blueprint::new(
            BlueprintId::new(self.id),
            self.name.clone(),
            self.cells.iter().copied().map(GridPosition::from).collect(),
        )
        .with_vertical_offset(self.vertical_offset)
        .with_rotation_symmetry(self.rotation_symmetric)
    }
}

/// Core declaration.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CoreEntry {
    pub(crate) id: u32,
    /// Inactive cores are skipped by the sweep until activated.
    #[serde(default = "default_active")]
    pub(crate) active: bool,
}

const fn default_active() -> bool {
    true
}

/// Input applied at the start of a tick.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Step {
    pub(crate) tick: u32,
    pub(crate) action: Action,
}

/// Scripted input.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum Action {
    /// Moves the pointer over the centre of a cell.
    Point { cell: [i32; 2] },
    /// Moves the pointer to a pixel.
    Pointer { x: f32, y: f32 },
    /// Takes the pointer off the window.
    Leave,
    /// Selects a blueprint.
    Select { blueprint: u32 },
    /// Clears the selection.
    Cancel,
    /// Rotates the selection.
    Rotate,
    /// Confirms placement at the pointer.
    Place,
    /// Marks a core as dead.
    KillCore { core: u32 },
    /// Activates a core, which then registers itself.
    ActivateCore { core: u32 },
    /// Destroys a placed entity or core.
    DestroyEntity { entity: u32 },
}

impl StageFile {
    /// Parses and validates a stage script.
    pub(crate) fn parse(source: &str) -> Result<Self, StageError> {
        let stage: Self = toml::from_str(source)?;
        stage.validate()?;
        Ok(stage)
    }

    fn validate(&self) -> Result<(), StageError> {
        if self.frame_ms == 0 {
            return Err(StageError::ZeroFrame);
        }

        let mut blueprints = HashSet::new();
        for entry in &self.blueprints {
            if entry.cells.is_empty() {
                return Err(StageError::EmptyBlueprint { id: entry.id });
            }
            if !blueprints.insert(entry.id) {
                return Err(StageError::DuplicateBlueprint { id: entry.id });
            }
        }

        let mut cores = HashSet::new();
        for entry in &self.cores {
            if !cores.insert(entry.id) {
                return Err(StageError::DuplicateCore { id: entry.id });
            }
        }

        for step in &self.steps {
            match step.action {
                Action::Select { blueprint } if !blueprints.contains(&blueprint) => {
                    return Err(StageError::UnknownBlueprint {
                        tick: step.tick,
                        id: blueprint,
                    });
                }
                Action::KillCore { core } | Action::ActivateCore { core }
                    if !cores.contains(&core) =>
                {
                    return Err(StageError::UnknownCore {
                        tick: step.tick,
                        id: core,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Obstacle cells as grid positions.
    pub(crate) fn obstacle_cells(&self) -> Vec<GridPosition> {
        self.obstacles.iter().copied().map(GridPosition::from).collect()
    }
}
