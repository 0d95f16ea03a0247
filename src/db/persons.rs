use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqliteConnection;

use super::row_helpers::map_person_row;
use super::NotFoundError;
use crate::models::*;

/// Fully resolved row for a new account; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: Role,
    pub verified: bool,
    pub owner_request: bool,
    pub password_hash: String,
}

/// Person database operations
pub struct PersonRepo;

impl PersonRepo {
    pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Person>> {
        let rows = sqlx::query("SELECT * FROM persons ORDER BY last_name, first_name")
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_person_row).collect())
    }

    pub async fn list_by_role(conn: &mut SqliteConnection, role: Role) -> Result<Vec<Person>> {
        let rows = sqlx::query("SELECT * FROM persons WHERE role = ? ORDER BY last_name, first_name")
            .bind(role)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_person_row).collect())
    }

    pub async fn list_owner_requests(conn: &mut SqliteConnection) -> Result<Vec<Person>> {
        let rows = sqlx::query("SELECT * FROM persons WHERE owner_request = 1 ORDER BY created_at")
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(map_person_row).collect())
    }

    pub async fn count_by_role(conn: &mut SqliteConnection, role: Role) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM persons WHERE role = ?")
            .bind(role)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count.0)
    }

    pub async fn get(conn: &mut SqliteConnection, id: i64) -> Result<Option<Person>> {
        let row = sqlx::query("SELECT * FROM persons WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_person_row))
    }

    pub async fn get_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<Person>> {
        let row = sqlx::query("SELECT * FROM persons WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_person_row))
    }

    pub async fn get_by_phone(conn: &mut SqliteConnection, phone: &str) -> Result<Option<Person>> {
        let row = sqlx::query("SELECT * FROM persons WHERE phone = ?")
            .bind(phone.trim())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.as_ref().map(map_person_row))
    }

    /// True when another account already uses this email
    pub async fn email_taken(conn: &mut SqliteConnection, email: &str, except: Option<i64>) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM persons WHERE email = ? AND id <> ?")
            .bind(email)
            .bind(except.unwrap_or(0))
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    pub async fn phone_taken(conn: &mut SqliteConnection, phone: &str, except: Option<i64>) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM persons WHERE phone = ? AND id <> ?")
            .bind(phone)
            .bind(except.unwrap_or(0))
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    /// Whether the person owns listings or is a party to any lease
    pub async fn in_use(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT (SELECT COUNT(*) FROM listings WHERE owner_id = ?)
                 + (SELECT COUNT(*) FROM leases WHERE tenant_id = ?)
            "#,
        )
        .bind(id)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count.0 > 0)
    }

    pub async fn create(conn: &mut SqliteConnection, person: &NewPerson) -> Result<Person> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO persons (first_name, last_name, email, phone, address, role, verified,
                                 owner_request, password_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&person.first_name)
        .bind(&person.last_name)
        .bind(&person.email)
        .bind(&person.phone)
        .bind(&person.address)
        .bind(person.role)
        .bind(person.verified)
        .bind(person.owner_request)
        .bind(&person.password_hash)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let new_id = result.last_insert_rowid();
        Self::get(conn, new_id)
            .await?
            .context("Person not found after creation")
    }

    /// Persist every editable column of an already-merged person
    pub async fn save(conn: &mut SqliteConnection, person: &Person) -> Result<Person> {
        let result = sqlx::query(
            r#"
            UPDATE persons SET first_name = ?, last_name = ?, email = ?, phone = ?, address = ?,
                               role = ?, verified = ?, owner_request = ?, password_hash = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&person.first_name)
        .bind(&person.last_name)
        .bind(&person.email)
        .bind(&person.phone)
        .bind(&person.address)
        .bind(person.role)
        .bind(person.verified)
        .bind(person.owner_request)
        .bind(&person.password_hash)
        .bind(Utc::now())
        .bind(person.id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Person", &person.id.to_string()).into());
        }

        Self::get(conn, person.id)
            .await?
            .context("Person not found after update")
    }

    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM persons WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(NotFoundError::new("Person", &id.to_string()).into());
        }
        Ok(())
    }
}
