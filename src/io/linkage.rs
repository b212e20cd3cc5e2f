use crate::config::ProjectPaths;
use crate::error::LinkError;
use crate::linking::{LinkageRow, LinkageTable, ObservationCell, RiverTable};
use csv::WriterBuilder;
use rusqlite::{Connection, params};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const SUB_GRID_FILE: &str = "sub_grid.txt";
pub const GRID_SUB_FILE: &str = "grid_sub.txt";
pub const RIVER_GRID_FILE: &str = "river_grid.txt";
pub const MODFLOW_OBS_FILE: &str = "modflow.obs";

// Same row, cell first
#[derive(Debug, Serialize)]
struct GridSubRecord {
    cell: u32,
    subbasin: u32,
    area: f64,
    fraction: f64,
}

impl From<&LinkageRow> for GridSubRecord {
    fn from(row: &LinkageRow) -> Self {
        GridSubRecord {
            cell: row.cell,
            subbasin: row.subbasin,
            area: row.area,
            fraction: row.fraction,
        }
    }
}

fn write_records<T: Serialize>(path: &Path, records: impl Iterator<Item = T>) -> Result<(), LinkError> {
    let io_err = |source| LinkError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .map_err(|e| io_err(e.into()))?;
    for record in records {
        wtr.serialize(record).map_err(|e| io_err(e.into()))?;
    }
    wtr.flush().map_err(io_err)?;
    Ok(())
}

/// Writes the linkage ordered by subbasin.
pub fn write_sub_grid(path: &Path, table: &LinkageTable) -> Result<(), LinkError> {
    write_records(path, table.rows().iter())
}

/// Writes the linkage ordered by cell.
pub fn write_grid_sub(path: &Path, table: &LinkageTable) -> Result<(), LinkError> {
    let rows = table.grid_sub();
    write_records(path, rows.iter().map(GridSubRecord::from))
}

/// Writes both orderings to `GIS/Table` and returns their paths.
pub fn write_linkage_files(
    paths: &ProjectPaths,
    table: &LinkageTable,
) -> Result<[PathBuf; 2], LinkError> {
    let sub_grid = paths.table.join(SUB_GRID_FILE);
    let grid_sub = paths.table.join(GRID_SUB_FILE);
    write_sub_grid(&sub_grid, table)?;
    write_grid_sub(&grid_sub, table)?;
    Ok([sub_grid, grid_sub])
}

/// Copies the linkage exports into the model folder, where the coupled
/// executable reads them.
pub fn copy_linkage_files(paths: &ProjectPaths) -> Result<(), LinkError> {
    for name in [SUB_GRID_FILE, GRID_SUB_FILE] {
        let to = paths.model.join(name);
        std::fs::copy(paths.table.join(name), &to).map_err(|source| LinkError::Io {
            path: to.clone(),
            source,
        })?;
        tracing::debug!(file = name, to = %to.display(), "copied linkage file");
    }
    Ok(())
}

/// Writes the river cells to `GIS/Table` and copies them into the model
/// folder. Returns the table path.
pub fn write_river_grid(paths: &ProjectPaths, table: &RiverTable) -> Result<PathBuf, LinkError> {
    let path = paths.table.join(RIVER_GRID_FILE);
    write_records(&path, table.rows().iter())?;
    let to = paths.model.join(RIVER_GRID_FILE);
    std::fs::copy(&path, &to).map_err(|source| LinkError::Io {
        path: to.clone(),
        source,
    })?;
    tracing::info!(rows = table.len(), cells = table.cells().len(), "wrote river cells");
    Ok(path)
}

/// Writes the observation cells read by MODFLOW into the model folder: a
/// comment line, the cell count, then one `grid_id point_id` line per cell.
/// A cell holding several points is listed once, under its lowest point id.
pub fn write_modflow_obs(paths: &ProjectPaths, cells: &[ObservationCell]) -> Result<PathBuf, LinkError> {
    let path = paths.model.join(MODFLOW_OBS_FILE);
    let mut unique: Vec<ObservationCell> = Vec::with_capacity(cells.len());
    for obs in cells {
        if !unique.iter().any(|u| u.cell == obs.cell) {
            unique.push(*obs);
        }
    }

    let io_err = |source| LinkError::Io {
        path: path.clone(),
        source,
    };
    let file = File::create(&path).map_err(io_err)?;
    let mut out = BufWriter::new(file);
    writeln!(out, "# {}: MODFLOW observation cells", MODFLOW_OBS_FILE).map_err(io_err)?;
    writeln!(out, "{}\tnumber of observation cells", unique.len()).map_err(io_err)?;
    for obs in &unique {
        writeln!(out, "{}\t{}", obs.cell, obs.point).map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;
    tracing::info!(cells = unique.len(), path = %path.display(), "wrote observation cells");
    Ok(path)
}

/// Project database holding the latest linkage.
pub struct LinkageStore {
    conn: Connection,
}

impl LinkageStore {
    pub fn open(path: &Path) -> Result<Self, LinkError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sub_grid (
                subbasin INTEGER NOT NULL,
                grid_id  INTEGER NOT NULL,
                area     REAL NOT NULL,
                fraction REAL NOT NULL,
                PRIMARY KEY (subbasin, grid_id)
            )",
        )?;
        Ok(LinkageStore { conn })
    }

    /// Replaces the stored linkage with `table`.
    pub fn save(&mut self, table: &LinkageTable) -> Result<(), LinkError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM sub_grid", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sub_grid (subbasin, grid_id, area, fraction) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for row in table.rows() {
                stmt.execute(params![row.subbasin, row.cell, row.area, row.fraction])?;
            }
        }
        tx.commit()?;
        tracing::info!(rows = table.len(), "saved linkage to project database");
        Ok(())
    }

    pub fn load(&self) -> Result<LinkageTable, LinkError> {
        let mut stmt = self
            .conn
            .prepare("SELECT subbasin, grid_id, area, fraction FROM sub_grid")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LinkageRow {
                    subbasin: row.get(0)?,
                    cell: row.get(1)?,
                    area: row.get(2)?,
                    fraction: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LinkageTable::new(rows))
    }
}
