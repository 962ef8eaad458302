use bastion_core::{CellCategory, EntityId, GridMutation, GridPosition, GridQuery};
use bastion_grid::{Grid, GridConfig};
use glam::Vec3;

fn grid_8x6() -> Grid {
    Grid::new(GridConfig::new(8, 6, 2.0).with_origin(Vec3::new(-4.0, 0.0, 10.0)))
        .expect("valid grid")
}

#[test]
fn snap_and_centre_are_consistent() {
    let grid = grid_8x6();

    let cell = GridPosition::new(3, 2);
    let centre = grid.grid_to_world(cell);

    assert_eq!(centre, Vec3::new(-4.0 + 7.0, 0.0, 10.0 + 5.0));
    assert_eq!(grid.snap_world_to_grid(centre), cell);
    assert_eq!(
        grid.snap_world_to_grid(centre + Vec3::new(0.99, 5.0, -0.99)),
        cell,
        "height is ignored and any point inside the cell snaps to it",
    );
}

#[test]
fn snapping_outside_produces_invalid_positions() {
    let grid = grid_8x6();

    let before_origin = grid.snap_world_to_grid(Vec3::new(-4.5, 0.0, 10.5));
    assert_eq!(before_origin, GridPosition::new(-1, 0));
    assert!(!grid.is_valid_position(before_origin));

    let far_away = grid.snap_world_to_grid(Vec3::splat(f32::MAX));
    assert!(!grid.is_valid_position(far_away));
}

#[test]
fn set_category_overwrites_category_and_owner_together() {
    let grid = grid_8x6();
    let cells = [GridPosition::new(1, 1), GridPosition::new(2, 1)];
    let owner = EntityId::new(9);

    grid.set_category(&cells, CellCategory::Reserved, Some(owner));
    for cell in cells {
        assert!(grid.has_category(cell, CellCategory::Reserved));
        assert_eq!(grid.owner(cell), Some(owner));
    }

    grid.set_category(&cells[..1], CellCategory::Walkable, None);
    assert!(grid.has_category(cells[0], CellCategory::Walkable));
    assert_eq!(grid.owner(cells[0]), None, "owner is replaced with the category");
    assert_eq!(grid.cells_owned_by(owner), vec![cells[1]]);
}

#[test]
fn mutations_outside_the_grid_are_ignored() {
    let grid = grid_8x6();
    let before = grid.snapshot();

    grid.set_category(
        &[GridPosition::new(8, 0), GridPosition::new(0, -1)],
        CellCategory::Reserved,
        Some(EntityId::new(1)),
    );

    assert_eq!(grid.snapshot(), before);
}

#[test]
fn obstacles_are_seeded_from_configuration() {
    let obstacles = [GridPosition::new(0, 0), GridPosition::new(7, 5)];
    let grid = Grid::with_obstacles(GridConfig::new(8, 6, 1.0), &obstacles).expect("valid seeds");

    assert_eq!(grid.cells_with_category(CellCategory::Obstacle), obstacles.to_vec());
    assert_eq!(grid.category(GridPosition::new(1, 0)), Some(CellCategory::Walkable));
    assert_eq!(grid.category(GridPosition::new(8, 0)), None);
}
