use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{named_params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::error::GatewayDbResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: Uuid,
    pub name: String,
    pub webhook_secret: String,
    pub suppressed_event_types: Vec<String>,
    pub created_at: DateTime<Utc>,
}

pub fn get_merchant_by_id(conn: &Connection, id: Uuid) -> GatewayDbResult<Option<Merchant>> {
    debug!(id = id.to_string(); "DB: Fetching merchant by id");

    let mut stmt = conn.prepare_cached(
        r#"
        SELECT id, name, webhook_secret, suppressed_event_types, created_at
        FROM merchants
        WHERE id = :id
        "#,
    )?;

    let merchant = stmt
        .query_row(named_params! { ":id": id.to_string() }, |row| {
            let id: String = row.get(0)?;
            let suppressed: String = row.get(3)?;
            Ok((id, row.get::<_, String>(1)?, row.get::<_, String>(2)?, suppressed, row.get::<_, String>(4)?))
        })
        .map(|(id, name, secret, suppressed, created_at)| Merchant {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            name,
            webhook_secret: secret,
            suppressed_event_types: serde_json::from_str(&suppressed).unwrap_or_default(),
            created_at: crate::db::parse_sqlite_datetime(&created_at),
        });

    match merchant {
        Ok(m) => Ok(Some(m)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
