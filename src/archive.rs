//! Question/answer archive kept across runs.
//!
//! Every answered turn is appended as one JSON line to `qa_history.jsonl`
//! in the archive directory. A session is the set of records sharing a
//! session id; summaries, search and statistics are computed from the file.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ArchiveSettings;
use crate::error::{Error, Result};
use crate::router::RoutingType;

pub const ARCHIVE_FILE: &str = "qa_history.jsonl";

/// Characters of the first question used as a session title
const TITLE_CHARS: usize = 50;

/// Personas listed in the statistics ranking
const TOP_PERSONAS: usize = 5;

/// One answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaRecord {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub answer: String,
    pub persona: String,
    pub role: String,
    pub routing: RoutingType,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub title: String,
    pub records: usize,
    pub started: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaCount {
    pub persona: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStats {
    pub total: usize,
    pub today: usize,
    pub sessions: usize,
    pub top_personas: Vec<PersonaCount>,
}

pub struct Archive {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Archive {
    /// Open (creating the directory if needed) the archive in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| Error::IoWrite {
            path: dir.to_path_buf(),
            source: e,
        })?;

        Ok(Self {
            path: dir.join(ARCHIVE_FILE),
            write_lock: Mutex::new(()),
        })
    }

    /// The configured archive, or `None` when archiving is disabled.
    pub fn from_settings(settings: &ArchiveSettings) -> Result<Option<Self>> {
        settings.resolved_dir().map(Self::open).transpose()
    }

    /// Like `from_settings`, but a disabled archive is an error.
    pub fn require(settings: &ArchiveSettings) -> Result<Self> {
        Self::from_settings(settings)?.ok_or_else(|| {
            Error::archive_unavailable("archiving is disabled or no data directory is available")
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &QaRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::IoWrite {
                path: self.path.clone(),
                source: e,
            })?;
        writeln!(file, "{}", line).map_err(|e| Error::IoWrite {
            path: self.path.clone(),
            source: e,
        })?;

        debug!(session = %record.session_id, persona = %record.persona, "Archived answer");
        Ok(())
    }

    /// Every record in append order. Unparsable lines are skipped.
    pub fn records(&self) -> Result<Vec<QaRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::IoRead {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let mut records = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<QaRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = i + 1, error = %e, "Skipping malformed archive line"),
            }
        }
        Ok(records)
    }

    /// Session summaries, most recently updated first.
    pub fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut sessions: Vec<SessionSummary> = Vec::new();
        let mut index: HashMap<Uuid, usize> = HashMap::new();

        for record in self.records()? {
            match index.get(&record.session_id) {
                Some(&i) => {
                    let summary = &mut sessions[i];
                    summary.records += 1;
                    summary.updated = summary.updated.max(record.timestamp);
                }
                None => {
                    index.insert(record.session_id, sessions.len());
                    sessions.push(SessionSummary {
                        session_id: record.session_id,
                        title: record.question.chars().take(TITLE_CHARS).collect(),
                        records: 1,
                        started: record.timestamp,
                        updated: record.timestamp,
                    });
                }
            }
        }

        sessions.sort_by(|a, b| b.updated.cmp(&a.updated));
        Ok(sessions)
    }

    /// Resolve a full session id or a unique prefix of one.
    pub fn resolve(&self, id: &str) -> Result<Uuid> {
        let id = id.trim().to_lowercase();
        let sessions = self.sessions()?;

        if let Some(exact) = sessions.iter().find(|s| s.session_id.to_string() == id) {
            return Ok(exact.session_id);
        }

        let matches: Vec<Uuid> = sessions
            .iter()
            .map(|s| s.session_id)
            .filter(|sid| !id.is_empty() && sid.to_string().starts_with(&id))
            .collect();

        match matches.as_slice() {
            [only] => Ok(*only),
            [] => Err(Error::session_not_found(id)),
            _ => Err(Error::SessionAmbiguous {
                id,
                matches: matches.len(),
            }),
        }
    }

    /// The records of one session in append order.
    pub fn session(&self, session_id: Uuid) -> Result<Vec<QaRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.session_id == session_id)
            .collect())
    }

    /// Records whose question or answer contains `keyword` (case-insensitive), newest first.
    pub fn search(&self, keyword: &str, limit: usize) -> Result<Vec<QaRecord>> {
        let needle = keyword.to_lowercase();
        let mut hits: Vec<QaRecord> = self
            .records()?
            .into_iter()
            .filter(|r| {
                r.question.to_lowercase().contains(&needle)
                    || r.answer.to_lowercase().contains(&needle)
            })
            .collect();

        hits.reverse();
        hits.truncate(limit);
        Ok(hits)
    }

    pub fn statistics(&self) -> Result<ArchiveStats> {
        let records = self.records()?;
        let today = Utc::now().date_naive();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in &records {
            *counts.entry(record.persona.as_str()).or_default() += 1;
        }

        let mut top_personas: Vec<PersonaCount> = counts
            .into_iter()
            .map(|(persona, count)| PersonaCount {
                persona: persona.to_string(),
                count,
            })
            .collect();
        top_personas.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.persona.cmp(&b.persona)));
        top_personas.truncate(TOP_PERSONAS);

        let mut sessions: Vec<Uuid> = records.iter().map(|r| r.session_id).collect();
        sessions.sort();
        sessions.dedup();

        Ok(ArchiveStats {
            total: records.len(),
            today: records
                .iter()
                .filter(|r| r.timestamp.date_naive() == today)
                .count(),
            sessions: sessions.len(),
            top_personas,
        })
    }
}
