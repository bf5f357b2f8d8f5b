use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::{select_as, tables, DataStore, Query, StoreError};

/// Identity record kept alongside the hosted auth user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<String>,
}

pub async fn get_profile(store: &dyn DataStore, user_id: &str) -> Result<Option<Profile>, StoreError> {
    let query = Query::new().eq("id", user_id).limit(1);
    let mut rows: Vec<Profile> = select_as(store, tables::PROFILES, &query).await?;
    Ok(rows.pop())
}
