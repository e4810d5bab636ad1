//! The spreadsheet as a record store of reels.
//!
//! [`SheetStore`] is the raw cell interface (implemented by the Google
//! Sheets client and by [`MemorySheet`]); [`ReelSheet`] layers the row
//! schema, Reel ID uniqueness and status transition rules on top of it.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use crate::error::{PipelineError, Result};
use crate::reel::single_line;
use crate::types::{Column, ReelRow, Status, HEADERS};

pub trait SheetStore {
    /// Every non-empty row of the worksheet, header included.
    fn read_all(&self) -> Result<Vec<Vec<String>>>;

    /// Overwrite rows starting at 1-based `start_row`, columns A..H.
    fn write_range(&self, start_row: usize, rows: &[Vec<String>]) -> Result<()>;

    /// Overwrite a single cell (1-based row).
    fn update_cell(&self, row: usize, col: Column, value: &str) -> Result<()>;

    /// Install the status dropdown and colour rules. Best effort.
    fn setup_status_formatting(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemorySheet
// ---------------------------------------------------------------------------

/// In-memory worksheet for tests.
#[derive(Debug, Default)]
pub struct MemorySheet {
    cells: Mutex<Vec<Vec<String>>>,
    writes: Mutex<usize>,
    formatted: Mutex<bool>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            cells: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Vec<Vec<String>> {
        self.cells.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of write calls (range or cell) made so far.
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }

    pub fn is_formatted(&self) -> bool {
        self.formatted.lock().map(|f| *f).unwrap_or(false)
    }

    fn bump_writes(&self) {
        if let Ok(mut w) = self.writes.lock() {
            *w += 1;
        }
    }
}

fn poisoned() -> PipelineError {
    PipelineError::Io(std::io::Error::other("sheet lock poisoned"))
}

impl SheetStore for MemorySheet {
    fn read_all(&self) -> Result<Vec<Vec<String>>> {
        let cells = self.cells.lock().map_err(|_| poisoned())?;
        Ok(cells.clone())
    }

    fn write_range(&self, start_row: usize, rows: &[Vec<String>]) -> Result<()> {
        if start_row == 0 {
            return Err(PipelineError::RowOutOfRange(0));
        }
        let mut cells = self.cells.lock().map_err(|_| poisoned())?;
        for (offset, row) in rows.iter().enumerate() {
            let idx = start_row - 1 + offset;
            while cells.len() <= idx {
                cells.push(Vec::new());
            }
            cells[idx] = row.clone();
        }
        drop(cells);
        self.bump_writes();
        Ok(())
    }

    fn update_cell(&self, row: usize, col: Column, value: &str) -> Result<()> {
        let mut cells = self.cells.lock().map_err(|_| poisoned())?;
        let line = row
            .checked_sub(1)
            .and_then(|i| cells.get_mut(i))
            .ok_or(PipelineError::RowOutOfRange(row))?;
        while line.len() <= col.index() {
            line.push(String::new());
        }
        line[col.index()] = value.to_string();
        drop(cells);
        self.bump_writes();
        Ok(())
    }

    fn setup_status_formatting(&self) -> Result<()> {
        let mut f = self.formatted.lock().map_err(|_| poisoned())?;
        *f = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ReelSheet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppendReport {
    /// Reel IDs written.
    pub added: Vec<String>,
    /// Reel IDs skipped as duplicates (already in the sheet or repeated in
    /// the batch) or rows without an ID.
    pub skipped: Vec<String>,
}

pub struct ReelSheet<S> {
    store: S,
    setup_formatting: bool,
}

impl<S: SheetStore> ReelSheet<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            setup_formatting: true,
        }
    }

    pub fn with_formatting(mut self, enabled: bool) -> Self {
        self.setup_formatting = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rewrite row 1 when it differs from the expected headers. Returns true
    /// when headers were written.
    pub fn ensure_headers(&self) -> Result<bool> {
        let all = self.store.read_all()?;
        let expected: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        let current = all.first().cloned().unwrap_or_default();
        if current == expected {
            return Ok(false);
        }
        tracing::info!("updating sheet headers");
        self.store.write_range(1, &[expected])?;
        if self.setup_formatting {
            if let Err(e) = self.store.setup_status_formatting() {
                tracing::warn!("could not set up status dropdown/colours: {e}");
            }
        }
        Ok(true)
    }

    /// All data rows (header skipped), with 1-based row indexes.
    pub fn rows(&self) -> Result<Vec<ReelRow>> {
        let all = self.store.read_all()?;
        Ok(all
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, cells)| cells.iter().any(|c| !c.trim().is_empty()))
            .map(|(i, cells)| ReelRow::from_cells(i + 1, cells))
            .collect())
    }

    pub fn existing_reel_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .rows()?
            .into_iter()
            .map(|r| r.reel_id)
            .filter(|id| !id.is_empty())
            .collect())
    }

    pub fn find_by_reel_id(&self, reel_id: &str) -> Result<ReelRow> {
        self.rows()?
            .into_iter()
            .find(|r| r.reel_id == reel_id)
            .ok_or_else(|| PipelineError::ReelNotFound(reel_id.to_string()))
    }

    /// Append rows whose Reel ID is not yet present. All rows are written in
    /// one range write after the last occupied row.
    pub fn append_reels(&self, reels: &[ReelRow]) -> Result<AppendReport> {
        let mut report = AppendReport::default();
        if reels.is_empty() {
            return Ok(report);
        }

        let all = self.store.read_all()?;
        let mut seen: HashSet<String> = all
            .iter()
            .skip(1)
            .filter_map(|cells| cells.get(Column::ReelId.index()))
            .filter(|id| !id.is_empty())
            .cloned()
            .collect();

        let mut to_write = Vec::new();
        for reel in reels {
            let status: Status = reel.status.parse()?;
            if reel.reel_id.is_empty() || !seen.insert(reel.reel_id.clone()) {
                tracing::debug!("skipping duplicate reel '{}'", reel.reel_id);
                report.skipped.push(reel.reel_id.clone());
                continue;
            }
            let mut row = reel.clone();
            row.status = status.to_string();
            row.description = single_line(&row.description);
            to_write.push(row.to_cells());
            report.added.push(reel.reel_id.clone());
        }

        if to_write.is_empty() {
            return Ok(report);
        }

        let mut next_row = all.len() + 1;
        if all.is_empty() {
            let headers: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
            self.store.write_range(1, &[headers])?;
            next_row = 2;
        }
        self.store.write_range(next_row, &to_write)?;
        tracing::info!(
            "added {} reel(s) to sheet, skipped {} duplicate(s)",
            report.added.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    pub fn rows_by_status(&self, status: Status) -> Result<Vec<ReelRow>> {
        Ok(self
            .rows()?
            .into_iter()
            .filter(|r| r.parsed_status() == Some(status))
            .collect())
    }

    pub fn rows_missing_description(&self, status: Status) -> Result<Vec<ReelRow>> {
        Ok(self
            .rows_by_status(status)?
            .into_iter()
            .filter(|r| !r.link.is_empty() && !r.has_description())
            .collect())
    }

    /// Row count per status; rows with an unrecognised status are counted
    /// under `"invalid"`.
    pub fn status_counts(&self) -> Result<BTreeMap<String, usize>> {
        Ok(count_by_status(&self.rows()?))
    }

    /// Move a row to `to`, enforcing the transition rules. Returns false when
    /// the row already had that status (nothing written).
    pub fn set_status(&self, row: usize, to: Status) -> Result<bool> {
        let current = self.row(row)?;
        match current.parsed_status() {
            Some(from) if from == to => return Ok(false),
            Some(from) if !from.can_transition_to(to) => {
                return Err(PipelineError::InvalidTransition {
                    row,
                    from: from.to_string(),
                    to: to.to_string(),
                })
            }
            None if to != Status::Pending => {
                return Err(PipelineError::InvalidTransition {
                    row,
                    from: current.status.clone(),
                    to: to.to_string(),
                })
            }
            _ => {}
        }
        self.store.update_cell(row, Column::Status, to.as_str())?;
        tracing::info!("row {row}: status -> {to}");
        Ok(true)
    }

    pub fn set_description(&self, row: usize, description: &str) -> Result<()> {
        self.store
            .update_cell(row, Column::Description, &single_line(description))
    }

    pub fn set_youtube(&self, row: usize, posted_date: Option<&str>, shorts_id: Option<&str>) -> Result<()> {
        if let Some(d) = posted_date.filter(|d| !d.is_empty()) {
            self.store.update_cell(row, Column::YtPostedDate, d)?;
        }
        if let Some(id) = shorts_id.filter(|id| !id.is_empty()) {
            self.store.update_cell(row, Column::ShortsId, id)?;
        }
        Ok(())
    }

    fn row(&self, row: usize) -> Result<ReelRow> {
        if row < 2 {
            return Err(PipelineError::RowOutOfRange(row));
        }
        let all = self.store.read_all()?;
        all.get(row - 1)
            .map(|cells| ReelRow::from_cells(row, cells))
            .ok_or(PipelineError::RowOutOfRange(row))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Every known status starts at zero; unrecognised values land under
/// `"invalid"`.
pub fn count_by_status(rows: &[ReelRow]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = Status::all()
        .iter()
        .map(|s| (s.to_string(), 0))
        .collect();
    for row in rows {
        let key = row
            .parsed_status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "invalid".to_string());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}
