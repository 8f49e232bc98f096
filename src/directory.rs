use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Gender, Guest};

/// A participant whose attendance is confirmed and who may be given a bed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedGuest {
    pub participant_id: i64,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub event_id: Option<i64>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("participant {0} is not a confirmed guest")]
    UnknownParticipant(i64),
    #[error("guest directory unavailable: {0}")]
    Unavailable(String),
}

/// Source of confirmed guests, kept outside the allocation engine.
#[async_trait]
pub trait GuestDirectory: Send + Sync {
    async fn lookup(&self, tenant: &str, participant_id: i64) -> Result<Option<ConfirmedGuest>, DirectoryError>;

    /// All confirmed guests of the tenant, ordered by name.
    async fn list(&self, tenant: &str) -> Result<Vec<ConfirmedGuest>, DirectoryError>;

    async fn upsert(&self, tenant: &str, guest: ConfirmedGuest) -> Result<(), DirectoryError>;
}

/// Directory held in process memory, keyed by (tenant, participant id).
#[derive(Default)]
pub struct InMemoryGuestDirectory {
    guests: DashMap<(String, i64), ConfirmedGuest>,
}

impl InMemoryGuestDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GuestDirectory for InMemoryGuestDirectory {
    async fn lookup(&self, tenant: &str, participant_id: i64) -> Result<Option<ConfirmedGuest>, DirectoryError> {
        Ok(self
            .guests
            .get(&(tenant.to_string(), participant_id))
            .map(|g| g.value().clone()))
    }

    async fn list(&self, tenant: &str) -> Result<Vec<ConfirmedGuest>, DirectoryError> {
        let mut out: Vec<ConfirmedGuest> = self
            .guests
            .iter()
            .filter(|e| e.key().0 == tenant)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.participant_id.cmp(&b.participant_id)));
        Ok(out)
    }

    async fn upsert(&self, tenant: &str, guest: ConfirmedGuest) -> Result<(), DirectoryError> {
        self.guests
            .insert((tenant.to_string(), guest.participant_id), guest);
        Ok(())
    }
}

/// Fill the blanks of `guest` from the directory entry of its participant.
///
/// Fields given in the request win. An unknown participant id is an error;
/// a guest without participant id is returned unchanged.
pub async fn resolve_guest(
    directory: &dyn GuestDirectory,
    tenant: &str,
    mut guest: Guest,
) -> Result<Guest, DirectoryError> {
    let Some(pid) = guest.participant_id else {
        return Ok(guest);
    };
    let confirmed = directory
        .lookup(tenant, pid)
        .await?
        .ok_or(DirectoryError::UnknownParticipant(pid))?;

    if guest.name.trim().is_empty() {
        guest.name = confirmed.name;
    }
    if guest.email.trim().is_empty() {
        guest.email = confirmed.email;
    }
    if guest.phone.trim().is_empty() {
        guest.phone = confirmed.phone;
    }
    if guest.gender == Gender::Unspecified {
        guest.gender = confirmed.gender;
    }
    Ok(guest)
}
