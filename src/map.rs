use crate::config::ArenaConfig;
use crate::error::{MapIoError, ObserverError};
use crate::types::{Cell, CellChange, Position};
use log::warn;
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

/// Receives the exact list of changed cells after each batch mutation.
pub trait GridObserver: Send {
    fn name(&self) -> &str;
    fn on_cells_changed(&mut self, changes: &[CellChange]) -> Result<(), ObserverError>;
}

/// Forwards change lists to an async consumer.
pub struct ChannelObserver {
    name: String,
    tx: UnboundedSender<Vec<CellChange>>,
}

impl ChannelObserver {
    pub fn new(name: impl Into<String>, tx: UnboundedSender<Vec<CellChange>>) -> Self {
        Self { name: name.into(), tx }
    }
}

impl GridObserver for ChannelObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_cells_changed(&mut self, changes: &[CellChange]) -> Result<(), ObserverError> {
        self.tx
            .send(changes.to_vec())
            .map_err(|_| ObserverError::new(&self.name, "receiver dropped"))
    }
}

/// Which existing values a list mutation must leave alone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverwritePolicy {
    pub keep_existing_obstacle: bool,
    pub keep_existing_clear: bool,
}

impl OverwritePolicy {
    pub const OVERWRITE_ALL: Self = Self {
        keep_existing_obstacle: false,
        keep_existing_clear: false,
    };

    fn allows(&self, current: Cell) -> bool {
        match current {
            Cell::Obstacle => !self.keep_existing_obstacle,
            Cell::Clear => !self.keep_existing_clear,
            _ => true,
        }
    }
}

pub struct Grid {
    tiles: Vec<Vec<Cell>>,
    fixed: Vec<Vec<bool>>,
    width: usize,
    height: usize,
    start_center: Position,
    end_center: Position,
    observers: Vec<Box<dyn GridObserver>>,
}

impl Grid {
    /// All-unknown grid with the start and end zones pinned clear.
    pub fn new(width: usize, height: usize, start_center: Position, end_center: Position) -> Self {
        let mut grid = Self {
            tiles: vec![vec![Cell::Unknown; width]; height],
            fixed: vec![vec![false; width]; height],
            width,
            height,
            start_center,
            end_center,
            observers: Vec::new(),
        };
        grid.pin_zones();
        grid
    }

    pub fn from_config(arena: &ArenaConfig) -> Self {
        Self::new(arena.width, arena.height, arena.start_center, arena.end_center)
    }

    /// Grid holding `rows` (`rows[y][x]`), zones pinned clear.
    pub fn with_cells(rows: Vec<Vec<Cell>>, start_center: Position, end_center: Position) -> Result<Self, MapIoError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if width == 0 || rows.iter().any(|row| row.len() != width) {
            return Err(MapIoError::Format("rows must be non-empty and of equal length".into()));
        }
        let mut grid = Self::new(width, height, start_center, end_center);
        grid.tiles = rows;
        grid.pin_zones();
        Ok(grid)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn start_center(&self) -> Position {
        self.start_center
    }

    pub fn end_center(&self) -> Position {
        self.end_center
    }

    /// Row-major view, `rows()[y][x]`.
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.tiles
    }

    pub fn is_out_of_arena(&self, pos: Position) -> bool {
        pos.x < 0 || pos.y < 0 || pos.x as usize >= self.width || pos.y as usize >= self.height
    }

    pub fn get_cell(&self, pos: Position) -> Option<Cell> {
        if self.is_out_of_arena(pos) {
            return None;
        }
        Some(self.tiles[pos.y as usize][pos.x as usize])
    }

    pub fn is_fixed(&self, pos: Position) -> bool {
        !self.is_out_of_arena(pos) && self.fixed[pos.y as usize][pos.x as usize]
    }

    /// Set one cell. Returns whether the value changed.
    pub fn set_cell(&mut self, pos: Position, value: Cell) -> bool {
        match self.write(pos, value, OverwritePolicy::OVERWRITE_ALL) {
            Some(change) => {
                self.notify(&[change]);
                true
            }
            None => false,
        }
    }

    /// Set every in-arena, non-fixed position allowed by `policy`.
    pub fn set_cell_list(&mut self, positions: &[Position], value: Cell, policy: OverwritePolicy) -> Vec<CellChange> {
        let changes: Vec<CellChange> = positions
            .iter()
            .filter_map(|pos| self.write(*pos, value, policy))
            .collect();
        self.notify(&changes);
        changes
    }

    /// Set and pin cells; later writes leave them untouched.
    pub fn set_fixed_cells(&mut self, positions: &[Position], value: Cell) -> Vec<CellChange> {
        let mut changes = Vec::new();
        for pos in positions {
            if self.is_out_of_arena(*pos) {
                continue;
            }
            let (x, y) = (pos.x as usize, pos.y as usize);
            self.fixed[y][x] = true;
            if self.tiles[y][x] != value {
                self.tiles[y][x] = value;
                changes.push(CellChange::new(*pos, value));
            }
        }
        self.notify(&changes);
        changes
    }

    /// Swap in loaded cells of the same dimensions.
    pub fn replace_cells(&mut self, rows: Vec<Vec<Cell>>) -> Result<(), MapIoError> {
        let found_height = rows.len();
        let found_width = rows.first().map_or(0, Vec::len);
        if found_height != self.height || rows.iter().any(|row| row.len() != self.width) {
            return Err(MapIoError::Dimensions {
                width: self.width,
                height: self.height,
                found_width,
                found_height,
            });
        }
        self.tiles = rows;
        self.fixed = vec![vec![false; self.width]; self.height];
        self.pin_zones();
        let all = self.all_cells();
        self.notify(&all);
        Ok(())
    }

    /// Back to all-unknown; observers see every coordinate.
    pub fn reset(&mut self) {
        self.tiles = vec![vec![Cell::Unknown; self.width]; self.height];
        self.fixed = vec![vec![false; self.width]; self.height];
        self.pin_zones();
        let all = self.all_cells();
        self.notify(&all);
    }

    /// In-arena 8-neighbourhood of `pos`.
    pub fn surrounding_positions(&self, pos: Position) -> Vec<Position> {
        pos.block()
            .into_iter()
            .filter(|p| *p != pos && !self.is_out_of_arena(*p))
            .collect()
    }

    /// The outer ring of cells.
    pub fn along_wall_positions(&self) -> Vec<Position> {
        let (w, h) = (self.width as i32, self.height as i32);
        let mut ring = Vec::new();
        for y in 0..h {
            for x in 0..w {
                if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                    ring.push(Position::new(x, y));
                }
            }
        }
        ring
    }

    pub fn unknown_percentage(&self) -> f64 {
        let total = self.width * self.height;
        if total == 0 {
            return 0.0;
        }
        let unknown = self.tiles.iter().flatten().filter(|c| **c == Cell::Unknown).count();
        unknown as f64 * 100.0 / total as f64
    }

    /// Percentage of known cells, recomputed each call.
    pub fn coverage(&self) -> f64 {
        100.0 - self.unknown_percentage()
    }

    pub fn is_fully_explored(&self) -> bool {
        !self.tiles.iter().flatten().any(|c| *c == Cell::Unknown)
    }

    pub fn add_observer(&mut self, observer: Box<dyn GridObserver>) {
        self.observers.push(observer);
    }

    fn write(&mut self, pos: Position, value: Cell, policy: OverwritePolicy) -> Option<CellChange> {
        if self.is_out_of_arena(pos) || self.is_fixed(pos) {
            return None;
        }
        let cell = &mut self.tiles[pos.y as usize][pos.x as usize];
        if *cell == value || !policy.allows(*cell) {
            return None;
        }
        *cell = value;
        Some(CellChange::new(pos, value))
    }

    fn pin_zones(&mut self) {
        for center in [self.start_center, self.end_center] {
            for pos in center.block() {
                if self.is_out_of_arena(pos) {
                    continue;
                }
                self.tiles[pos.y as usize][pos.x as usize] = Cell::Clear;
                self.fixed[pos.y as usize][pos.x as usize] = true;
            }
        }
    }

    fn all_cells(&self) -> Vec<CellChange> {
        let mut all = Vec::with_capacity(self.width * self.height);
        for (y, row) in self.tiles.iter().enumerate() {
            for (x, cell) in row.iter().enumerate() {
                all.push(CellChange::new(Position::new(x as i32, y as i32), *cell));
            }
        }
        all
    }

    fn notify(&mut self, changes: &[CellChange]) {
        if changes.is_empty() {
            return;
        }
        for observer in self.observers.iter_mut() {
            if let Err(e) = observer.on_cells_changed(changes) {
                warn!("{e}");
            }
        }
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("start_center", &self.start_center)
            .field("end_center", &self.end_center)
            .field("observers", &self.observers.len())
            .finish()
    }
}
