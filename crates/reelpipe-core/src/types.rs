use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Status {
    pub fn all() -> &'static [Status] {
        &[
            Status::Pending,
            Status::Processing,
            Status::Completed,
            Status::Failed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    /// Whether a row may move from `self` to `to`. Re-setting the same
    /// status is always allowed and treated as a no-op by the sheet layer.
    pub fn can_transition_to(self, to: Status) -> bool {
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (Status::Pending, Status::Processing)
                | (Status::Pending, Status::Failed)
                | (Status::Processing, Status::Completed)
                | (Status::Processing, Status::Failed)
                | (Status::Failed, Status::Pending)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "processing" => Ok(Status::Processing),
            "completed" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            _ => Err(crate::error::PipelineError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Sheet columns
// ---------------------------------------------------------------------------

pub const HEADERS: [&str; 8] = [
    "Date",
    "Username",
    "Link",
    "Reel ID",
    "Description",
    "Status",
    "YT Posted Date",
    "Shorts ID",
];

/// Zero-based column positions in the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Date = 0,
    Username = 1,
    Link = 2,
    ReelId = 3,
    Description = 4,
    Status = 5,
    YtPostedDate = 6,
    ShortsId = 7,
}

impl Column {
    pub fn index(self) -> usize {
        self as usize
    }

    /// A1 column letter.
    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }
}

pub const LAST_COLUMN: char = 'H';

// ---------------------------------------------------------------------------
// ReelRow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReelRow {
    /// 1-based sheet row; 0 for rows not yet written.
    #[serde(default)]
    pub row_index: usize,
    pub date: String,
    pub username: String,
    pub link: String,
    pub reel_id: String,
    #[serde(default)]
    pub description: String,
    /// Raw cell text; see [`ReelRow::parsed_status`].
    pub status: String,
    #[serde(default)]
    pub yt_posted_date: String,
    #[serde(default)]
    pub shorts_id: String,
}

impl ReelRow {
    pub fn new_pending(
        date: impl Into<String>,
        username: impl Into<String>,
        link: impl Into<String>,
        reel_id: impl Into<String>,
    ) -> Self {
        Self {
            row_index: 0,
            date: date.into(),
            username: username.into(),
            link: link.into(),
            reel_id: reel_id.into(),
            description: String::new(),
            status: Status::Pending.to_string(),
            yt_posted_date: String::new(),
            shorts_id: String::new(),
        }
    }

    pub fn from_cells(row_index: usize, cells: &[String]) -> Self {
        let cell = |c: Column| cells.get(c.index()).cloned().unwrap_or_default();
        Self {
            row_index,
            date: cell(Column::Date),
            username: cell(Column::Username),
            link: cell(Column::Link),
            reel_id: cell(Column::ReelId),
            description: cell(Column::Description),
            status: cell(Column::Status),
            yt_posted_date: cell(Column::YtPostedDate),
            shorts_id: cell(Column::ShortsId),
        }
    }

    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.username.clone(),
            self.link.clone(),
            self.reel_id.clone(),
            self.description.clone(),
            self.status.clone(),
            self.yt_posted_date.clone(),
            self.shorts_id.clone(),
        ]
    }

    pub fn parsed_status(&self) -> Option<Status> {
        self.status.parse().ok()
    }

    pub fn has_description(&self) -> bool {
        !self.description.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
