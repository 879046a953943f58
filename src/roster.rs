use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use moka::future::Cache;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::password::verify_password;
use crate::error::{AppError, AppResult};
use crate::model::user::{RosterEntry, Teacher};

const DEFAULT_ROLE: &str = "GURU";
const DEFAULT_EMPLOYMENT_STATUS: &str = "Non-ASN";

enum RosterSource {
    Remote { client: reqwest::Client, url: String },
    #[cfg(test)]
    Fixed(Arc<Vec<RosterEntry>>),
}

/// Teacher roster read from the spreadsheet export, cached for a short TTL.
pub struct Roster {
    source: RosterSource,
    cache: Cache<(), Arc<Vec<RosterEntry>>>,
    school: String,
}

impl Roster {
    pub fn remote(url: &str, ttl_secs: u64, school: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            source: RosterSource::Remote {
                client,
                url: url.to_string(),
            },
            cache: cache(ttl_secs),
            school: school.to_string(),
        })
    }

    #[cfg(test)]
    pub fn fixed(entries: Vec<RosterEntry>, school: &str) -> Self {
        Self {
            source: RosterSource::Fixed(Arc::new(entries)),
            cache: cache(300),
            school: school.to_string(),
        }
    }

    pub fn school(&self) -> &str {
        &self.school
    }

    pub async fn entries(&self) -> AppResult<Arc<Vec<RosterEntry>>> {
        self.cache
            .try_get_with((), self.load())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to load roster");
                AppError::Roster("could not reach the school roster, check the connection".into())
            })
    }

    /// Case-insensitive username lookup.
    pub async fn find(&self, username: &str) -> AppResult<Option<RosterEntry>> {
        let username = username.trim().to_lowercase();
        Ok(self
            .entries()
            .await?
            .iter()
            .find(|e| e.username.to_lowercase() == username)
            .cloned())
    }

    /// `None` for an unknown user, a wrong password, or a row without a usable hash.
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<Option<Teacher>> {
        let Some(entry) = self.find(username).await? else {
            debug!("Roster lookup: user not found");
            return Ok(None);
        };

        match verify_password(password, &entry.password_hash) {
            Ok(true) => Ok(Some(entry.to_teacher(&self.school))),
            Ok(false) => Ok(None),
            Err(e) => {
                warn!(error = %e, username = %entry.username, "Roster row has no valid argon2 hash, refusing login");
                Ok(None)
            }
        }
    }

    async fn load(&self) -> Result<Arc<Vec<RosterEntry>>> {
        match &self.source {
            RosterSource::Remote { client, url } => {
                let text = client
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?;
                let entries = parse_gviz(&text)?;
                debug!(rows = entries.len(), "Roster refreshed");
                Ok(Arc::new(entries))
            }
            #[cfg(test)]
            RosterSource::Fixed(entries) => Ok(Arc::clone(entries)),
        }
    }
}

fn cache(ttl_secs: u64) -> Cache<(), Arc<Vec<RosterEntry>>> {
    Cache::builder()
        .max_capacity(1)
        .time_to_live(Duration::from_secs(ttl_secs))
        .build()
}

/// Parses a Google Visualization response. Columns are positional:
/// username, password hash, name, NIP, role, employment status.
pub fn parse_gviz(text: &str) -> Result<Vec<RosterEntry>> {
    let start = text.find('{').ok_or_else(|| anyhow!("no JSON object in roster export"))?;
    let end = text.rfind('}').ok_or_else(|| anyhow!("no JSON object in roster export"))?;
    if end < start {
        return Err(anyhow!("malformed roster export"));
    }

    let json: Value =
        serde_json::from_str(&text[start..=end]).context("roster export is not valid JSON")?;
    let rows = json["table"]["rows"]
        .as_array()
        .ok_or_else(|| anyhow!("roster export has no table rows"))?;

    let entries = rows
        .iter()
        .filter_map(|row| {
            let cells = row["c"].as_array()?;
            let cell = |i: usize| cells.get(i).and_then(|c| cell_text(&c["v"]));

            let username = cell(0).filter(|u| !u.trim().is_empty())?;
            Some(RosterEntry {
                username: username.trim().to_string(),
                password_hash: cell(1).unwrap_or_default(),
                name: cell(2).unwrap_or_default(),
                employee_id: cell(3).unwrap_or_default(),
                role: cell(4).unwrap_or_else(|| DEFAULT_ROLE.to_string()),
                employment_status: cell(5)
                    .unwrap_or_else(|| DEFAULT_EMPLOYMENT_STATUS.to_string()),
            })
        })
        .collect();

    Ok(entries)
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(match (n.as_u64(), n.as_i64(), n.as_f64()) {
            (Some(u), _, _) => u.to_string(),
            (_, Some(i), _) => i.to_string(),
            // whole floats come from numeric cells such as NIP; shortest round-trip digits
            (_, _, Some(f)) if f.fract() == 0.0 && f.abs() < 1e21 => f.to_string(),
            _ => n.to_string(),
        }),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
