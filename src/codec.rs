//! Map persistence: text and bit-packed codecs behind a file-backed store.

use crate::error::MapIoError;
use crate::map::Grid;
use crate::types::Cell;
use log::info;
use std::path::Path;

/// Rows of cells, `rows[y][x]`.
pub type MapRows = Vec<Vec<Cell>>;

pub trait MapCodec {
    fn encode(&self, grid: &Grid) -> Vec<u8>;
    fn decode(&self, bytes: &[u8]) -> Result<MapRows, MapIoError>;
}

/// One line per row, one digit per cell.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextMapCodec;

impl MapCodec for TextMapCodec {
    fn encode(&self, grid: &Grid) -> Vec<u8> {
        let mut out = String::with_capacity((grid.width() + 1) * grid.height());
        for row in grid.rows() {
            for cell in row {
                out.push(char::from(b'0' + cell.value()));
            }
            out.push('\n');
        }
        out.into_bytes()
    }

    fn decode(&self, bytes: &[u8]) -> Result<MapRows, MapIoError> {
        let text = std::str::from_utf8(bytes).map_err(|e| MapIoError::Format(e.to_string()))?;
        let mut rows = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let row = line
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| {
                    c.to_digit(10)
                        .and_then(|d| Cell::from_value(d as u8))
                        .ok_or_else(|| MapIoError::Format(format!("line {}: bad cell `{c}`", number + 1)))
                })
                .collect::<Result<Vec<Cell>, MapIoError>>()?;
            rows.push(row);
        }
        let width = rows.first().map_or(0, Vec::len);
        if width == 0 || rows.iter().any(|row| row.len() != width) {
            return Err(MapIoError::Format("rows must be non-empty and of equal length".into()));
        }
        Ok(rows)
    }
}

/// Two hex lines.
///
/// Part 1 is `11`, one explored bit per cell, `11`, zero-padded to a byte.
/// Part 2 is one obstacle bit per explored cell, zero-padded to a byte.
#[derive(Clone, Copy, Debug)]
pub struct BitMapCodec {
    width: usize,
    height: usize,
    top_down: bool,
}

impl BitMapCodec {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            top_down: true,
        }
    }

    /// Rows are written starting from the bottom row.
    pub fn bottom_up(mut self) -> Self {
        self.top_down = false;
        self
    }

    fn row_order(&self) -> Vec<usize> {
        if self.top_down {
            (0..self.height).collect()
        } else {
            (0..self.height).rev().collect()
        }
    }
}

fn pack(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, bit)| if *bit { byte | (0x80 >> i) } else { byte })
        })
        .collect()
}

fn unpack(bytes: &[u8]) -> Vec<bool> {
    bytes
        .iter()
        .flat_map(|byte| (0..8).map(move |i| byte & (0x80 >> i) != 0))
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn from_hex(line: &str) -> Result<Vec<u8>, MapIoError> {
    let line = line.trim();
    if line.len() % 2 != 0 {
        return Err(MapIoError::Format("odd number of hex digits".into()));
    }
    (0..line.len())
        .step_by(2)
        .map(|i| {
            line.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| MapIoError::Format(format!("bad hex at offset {i}")))
        })
        .collect()
}

impl MapCodec for BitMapCodec {
    fn encode(&self, grid: &Grid) -> Vec<u8> {
        let rows = grid.rows();
        let mut explored = vec![true, true];
        let mut obstacles = Vec::new();
        for y in self.row_order() {
            for cell in rows.get(y).into_iter().flatten() {
                let known = *cell != Cell::Unknown;
                explored.push(known);
                if known {
                    obstacles.push(*cell == Cell::Obstacle);
                }
            }
        }
        explored.extend([true, true]);
        format!("{}\n{}\n", to_hex(&pack(&explored)), to_hex(&pack(&obstacles))).into_bytes()
    }

    fn decode(&self, bytes: &[u8]) -> Result<MapRows, MapIoError> {
        let text = std::str::from_utf8(bytes).map_err(|e| MapIoError::Format(e.to_string()))?;
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let part1 = unpack(&from_hex(lines.next().unwrap_or_default())?);
        let part2 = unpack(&from_hex(lines.next().unwrap_or_default())?);

        let cells = self.width * self.height;
        if part1.len() < cells + 4 {
            return Err(MapIoError::Format(format!(
                "explored part holds {} bits, need {}",
                part1.len(),
                cells + 4
            )));
        }
        if !(part1[0] && part1[1] && part1[cells + 2] && part1[cells + 3]) {
            return Err(MapIoError::Format("missing 11 padding around explored bits".into()));
        }

        let mut obstacle_bits = part2.into_iter();
        let mut rows = vec![vec![Cell::Unknown; self.width]; self.height];
        for (i, y) in self.row_order().into_iter().enumerate() {
            for x in 0..self.width {
                if !part1[2 + i * self.width + x] {
                    continue;
                }
                let obstacle = obstacle_bits
                    .next()
                    .ok_or_else(|| MapIoError::Format("obstacle part is too short".into()))?;
                rows[y][x] = if obstacle { Cell::Obstacle } else { Cell::Clear };
            }
        }
        Ok(rows)
    }
}

/// Load and save maps by path.
pub trait MapStore: Send {
    fn load(&self, path: &Path) -> Result<MapRows, MapIoError>;
    fn save(&self, path: &Path, grid: &Grid) -> Result<(), MapIoError>;
}

/// Files ending in `.bin` use the bit-packed codec, anything else is text.
#[derive(Clone, Copy, Debug)]
pub struct FileMapStore {
    text: TextMapCodec,
    bits: BitMapCodec,
}

impl FileMapStore {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            text: TextMapCodec,
            bits: BitMapCodec::new(width, height),
        }
    }

    fn codec_for(&self, path: &Path) -> &dyn MapCodec {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") => &self.bits,
            _ => &self.text,
        }
    }
}

impl MapStore for FileMapStore {
    fn load(&self, path: &Path) -> Result<MapRows, MapIoError> {
        let bytes = std::fs::read(path)?;
        let rows = self.codec_for(path).decode(&bytes)?;
        info!("loaded {}x{} map from {}", rows.first().map_or(0, Vec::len), rows.len(), path.display());
        Ok(rows)
    }

    fn save(&self, path: &Path, grid: &Grid) -> Result<(), MapIoError> {
        std::fs::write(path, self.codec_for(path).encode(grid))?;
        info!("saved map to {}", path.display());
        Ok(())
    }
}
