use {
    crate::domain::{audit::NewAuditEntry, error::EngineError},
    sqlx::PgConnection,
};

pub async fn insert_audit_entry(
    conn: &mut PgConnection,
    entry: &NewAuditEntry,
) -> Result<(), EngineError> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, entity_type, entity_id, action, actor, detail)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(entry.id)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.action)
    .bind(&entry.actor)
    .bind(&entry.detail)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
