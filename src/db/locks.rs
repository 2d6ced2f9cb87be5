use log::debug;
use rusqlite::{named_params, Connection};

use crate::db::error::GatewayDbResult;

/// Attempts to acquire (or renew, if already held by `holder`) a named
/// lease for `ttl_seconds`. Returns `true` if the caller now holds the
/// lease. Backs the single-active-worker pattern for the sweeper and
/// confirmation-poll tasks when more than one instance of the gateway is
/// running against the same database.
pub fn acquire_lease(conn: &Connection, name: &str, holder: &str, ttl_seconds: i64) -> GatewayDbResult<bool> {
    let acquired = conn.execute(
        r#"
        INSERT INTO locks (name, holder, lease_expires_at)
        VALUES (:name, :holder, datetime('now', :ttl))
        ON CONFLICT (name) DO UPDATE SET
            holder = excluded.holder,
            lease_expires_at = excluded.lease_expires_at
        WHERE locks.holder = :holder OR locks.lease_expires_at <= datetime('now')
        "#,
        named_params! { ":name": name, ":holder": holder, ":ttl": format!("+{ttl_seconds} seconds") },
    )?;

    let held = acquired > 0;
    debug!(lock = name, holder = holder, held = held; "DB: Lease acquisition attempt");
    Ok(held)
}

pub fn release_lease(conn: &Connection, name: &str, holder: &str) -> GatewayDbResult<()> {
    conn.execute(
        "DELETE FROM locks WHERE name = :name AND holder = :holder",
        named_params! { ":name": name, ":holder": holder },
    )?;
    Ok(())
}
