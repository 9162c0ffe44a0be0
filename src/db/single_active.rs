//! Enforces "at most one active announcement".
//!
//! Both functions expect to run inside the transaction that performs the
//! activating write, so the deactivation and the activation commit together.

use sqlx::PgConnection;

/// Advisory lock key serialising every activating write.
const ACTIVATION_LOCK_KEY: i64 = 0x616e_6e6f_756e_6365;

/// Block until no other transaction is activating a record. Released
/// automatically at commit or rollback.
pub async fn lock(conn: &mut PgConnection) -> sqlx::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ACTIVATION_LOCK_KEY)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Set `active = false` on every record except `target` (or on all records
/// when `target` is `None`). Returns the number of rows switched off.
pub async fn activate_exclusive(conn: &mut PgConnection, target: Option<i64>) -> sqlx::Result<u64> {
    let result = match target {
        Some(id) => {
            sqlx::query("UPDATE announcements SET active = FALSE WHERE active AND id <> $1")
                .bind(id)
                .execute(&mut *conn)
                .await?
        }
        None => {
            sqlx::query("UPDATE announcements SET active = FALSE WHERE active")
                .execute(&mut *conn)
                .await?
        }
    };

    let switched_off = result.rows_affected();
    if switched_off > 0 {
        tracing::info!(switched_off, keep = ?target, "deactivated previous announcements");
    }
    Ok(switched_off)
}
