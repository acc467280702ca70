//! Record metadata queries: idempotent insert, listings, delta views,
//! soft delete.

use cask_types::now_unix;
use cask_types::record::{Record, RecordType, Tombstone};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::{conflict_on_constraint, parse_uuid, DbError, Result};

const RECORD_COLUMNS: &str = "id, owner_id, name, description, encrypted_data, blob_key,
     encrypted_key, algorithm, type, encrypted_chunk_size, request_id,
     created_at, updated_at, deleted_at";

/// Insert a record and return the stored copy.
///
/// Creates are idempotent per `(owner_id, request_id)`: when the row already
/// exists for the same idempotency key, the existing row is returned
/// unchanged and the new payload is discarded.
pub fn create(conn: &Connection, record: &Record) -> Result<Record> {
    let now = now_unix();
    let changed = conn
        .execute(
            "INSERT INTO records (id, owner_id, name, description, encrypted_data, blob_key,
                                  encrypted_key, algorithm, type, encrypted_chunk_size,
                                  request_id, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, NULL)
             ON CONFLICT (owner_id, request_id) WHERE request_id IS NOT NULL DO NOTHING",
            rusqlite::params![
                record.id.to_string(),
                record.owner_id.to_string(),
                record.name,
                record.description,
                record.encrypted_data,
                record.blob_key,
                record.encrypted_key,
                record.algorithm,
                record.record_type.as_str(),
                record.encrypted_chunk_size,
                record.request_id.map(|id| id.to_string()),
                now as i64,
            ],
        )
        .map_err(|e| conflict_on_constraint(e, "record id"))?;

    if changed == 0 {
        // Lost to an earlier create with the same idempotency key.
        let request_id = record.request_id.ok_or(DbError::NotFound)?;
        return get_by_request_id(conn, record.owner_id, request_id);
    }

    let mut saved = record.clone();
    saved.created_at = now;
    saved.updated_at = now;
    saved.deleted_at = None;
    Ok(saved)
}

/// Fetch a non-deleted record by id.
pub fn get_by_id(conn: &Connection, id: Uuid) -> Result<Record> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1 AND deleted_at IS NULL");
    conn.query_row(&sql, rusqlite::params![id.to_string()], record_from_row)
        .optional()?
        .ok_or(DbError::NotFound)?
}

fn get_by_request_id(conn: &Connection, owner_id: Uuid, request_id: Uuid) -> Result<Record> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM records WHERE owner_id = ?1 AND request_id = ?2 LIMIT 1"
    );
    conn.query_row(
        &sql,
        rusqlite::params![owner_id.to_string(), request_id.to_string()],
        record_from_row,
    )
    .optional()?
    .ok_or(DbError::NotFound)?
}

/// All non-deleted records of a user, newest first.
pub fn list_by_owner(
    conn: &Connection,
    owner_id: Uuid,
    record_type: Option<RecordType>,
) -> Result<Vec<Record>> {
    let (filter, params) = type_filter(owner_id, record_type);
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM records
         WHERE owner_id = ?1 {filter} AND deleted_at IS NULL
         ORDER BY created_at DESC"
    );
    collect_records(conn, &sql, &params)
}

/// Non-deleted records changed after the watermark, oldest first.
pub fn updated_after(
    conn: &Connection,
    owner_id: Uuid,
    record_type: Option<RecordType>,
    watermark: u64,
) -> Result<Vec<Record>> {
    let (filter, mut params) = type_filter(owner_id, record_type);
    params.push(rusqlite::types::Value::Integer(watermark as i64));
    let n = params.len();
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM records
         WHERE owner_id = ?1 {filter} AND deleted_at IS NULL AND updated_at > ?{n}
         ORDER BY updated_at ASC"
    );
    collect_records(conn, &sql, &params)
}

/// Tombstones for records deleted after the watermark, oldest first.
pub fn deleted_after(
    conn: &Connection,
    owner_id: Uuid,
    record_type: Option<RecordType>,
    watermark: u64,
) -> Result<Vec<Tombstone>> {
    let (filter, mut params) = type_filter(owner_id, record_type);
    params.push(rusqlite::types::Value::Integer(watermark as i64));
    let n = params.len();
    let sql = format!(
        "SELECT id, deleted_at FROM records
         WHERE owner_id = ?1 {filter} AND deleted_at IS NOT NULL AND deleted_at > ?{n}
         ORDER BY deleted_at ASC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, deleted_at) = row?;
        out.push(Tombstone {
            id: parse_uuid(&id)?,
            deleted_at: deleted_at as u64,
        });
    }
    Ok(out)
}

/// Soft-delete a record. The row stays behind to serve tombstones.
pub fn soft_delete(conn: &Connection, id: Uuid) -> Result<()> {
    let now = now_unix();
    let changed = conn.execute(
        "UPDATE records SET deleted_at = ?1, updated_at = ?1
         WHERE id = ?2 AND deleted_at IS NULL",
        rusqlite::params![now as i64, id.to_string()],
    )?;
    if changed == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

type SqlParams = Vec<rusqlite::types::Value>;

fn type_filter(owner_id: Uuid, record_type: Option<RecordType>) -> (String, SqlParams) {
    use rusqlite::types::Value;
    let mut params: SqlParams = vec![Value::Text(owner_id.to_string())];
    match record_type {
        Some(t) => {
            params.push(Value::Text(t.as_str().to_string()));
            ("AND type = ?2".to_string(), params)
        }
        None => (String::new(), params),
    }
}

fn collect_records(conn: &Connection, sql: &str, params: &SqlParams) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), record_from_row)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row??);
    }
    Ok(out)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Record>> {
    let id: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let name: String = row.get(2)?;
    let description: String = row.get(3)?;
    let encrypted_data: Option<Vec<u8>> = row.get(4)?;
    let blob_key: Option<String> = row.get(5)?;
    let encrypted_key: Vec<u8> = row.get(6)?;
    let algorithm: String = row.get(7)?;
    let record_type: String = row.get(8)?;
    let encrypted_chunk_size: i64 = row.get(9)?;
    let request_id: Option<String> = row.get(10)?;
    let created_at: i64 = row.get(11)?;
    let updated_at: i64 = row.get(12)?;
    let deleted_at: Option<i64> = row.get(13)?;

    Ok((|| {
        Ok(Record {
            id: parse_uuid(&id)?,
            owner_id: parse_uuid(&owner_id)?,
            name,
            description,
            encrypted_data,
            blob_key,
            encrypted_key,
            algorithm,
            record_type: RecordType::parse(&record_type)
                .ok_or_else(|| DbError::Corrupt(format!("unknown record type {record_type:?}")))?,
            encrypted_chunk_size: encrypted_chunk_size as u32,
            request_id: match request_id {
                Some(s) => Some(parse_uuid(&s)?),
                None => None,
            },
            created_at: created_at as u64,
            updated_at: updated_at as u64,
            deleted_at: deleted_at.map(|t| t as u64),
        })
    })())
}
