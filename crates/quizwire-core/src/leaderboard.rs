use serde::{Deserialize, Serialize};

/// A leaderboard row as encoded on the wire: `[name, score]`, name first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRow(pub String, pub i64);

/// One player's score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRecord {
    pub name: String,
    pub score: i64,
}

impl From<ScoreRow> for ScoreRecord {
    fn from(row: ScoreRow) -> Self {
        Self {
            name: row.0,
            score: row.1,
        }
    }
}

impl From<ScoreRecord> for ScoreRow {
    fn from(record: ScoreRecord) -> Self {
        Self(record.name, record.score)
    }
}

/// Local leaderboard cache. The server snapshot is authoritative: each
/// update replaces the previous contents wholesale, no merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leaderboard {
    entries: Vec<ScoreRecord>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<ScoreRow>) -> Self {
        let mut lb = Self::new();
        lb.replace(rows);
        lb
    }

    /// Replace the cached entries with a fresh server snapshot.
    pub fn replace(&mut self, rows: Vec<ScoreRow>) {
        self.entries = rows.into_iter().map(ScoreRecord::from).collect();
    }

    pub fn entries(&self) -> &[ScoreRecord] {
        &self.entries
    }

    /// Score for the given player, if present in the snapshot.
    pub fn score_for(&self, name: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.score)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
