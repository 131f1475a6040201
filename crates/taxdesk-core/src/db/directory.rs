//! Client and professional directories backed by the same database.
//!
//! The engine only reads these tables. The `upsert_*` helpers exist for
//! onboarding tools and tests that need to seed them.

use super::{SqliteStore, map_sqlite_error};
use crate::model::{Client, ClientId, Professional, Role, UserId};
use crate::store::{ClientDirectory, ProfessionalDirectory, StoreError};
use rusqlite::{OptionalExtension, params, types::Type};

impl SqliteStore {
    /// Insert or replace a client profile.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails, including when
    /// `default_ca_id` does not reference a known user.
    pub fn upsert_client(&self, client: &Client, at_us: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO clients (client_id, name, default_ca_id, created_at_us)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(client_id) DO UPDATE SET
                     name = excluded.name,
                     default_ca_id = excluded.default_ca_id",
                params![client.id, client.name, client.default_ca_id, at_us],
            )
            .map_err(|err| map_sqlite_error(err, "upsert client"))?;
        tracing::debug!(client_id = client.id, "upserted client");
        Ok(())
    }

    /// Insert or replace a user profile.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    pub fn upsert_professional(&self, user: &Professional, at_us: i64) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO professionals (user_id, name, role, is_active, created_at_us)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                     name = excluded.name,
                     role = excluded.role,
                     is_active = excluded.is_active",
                params![user.id, user.name, user.role.as_str(), user.is_active, at_us],
            )
            .map_err(|err| map_sqlite_error(err, "upsert professional"))?;
        tracing::debug!(user_id = user.id, role = %user.role, "upserted professional");
        Ok(())
    }
}

impl ClientDirectory for SqliteStore {
    fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        self.conn
            .query_row(
                "SELECT client_id, name, default_ca_id FROM clients WHERE client_id = ?1",
                params![id],
                |row| {
                    Ok(Client {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        default_ca_id: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|err| map_sqlite_error(err, "get client"))
    }
}

impl ProfessionalDirectory for SqliteStore {
    fn get_professional(&self, id: UserId) -> Result<Option<Professional>, StoreError> {
        self.conn
            .query_row(
                "SELECT user_id, name, role, is_active FROM professionals WHERE user_id = ?1",
                params![id],
                |row| {
                    let role: String = row.get(2)?;
                    let role: Role = role.parse().map_err(|err| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(err))
                    })?;
                    Ok(Professional {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        role,
                        is_active: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(|err| map_sqlite_error(err, "get professional"))
    }
}
