//! Database user provisioning
//!
//! Creates login roles for the people and services that read the collection
//! and the warehouse. Provisioning never aborts a run: every user gets a
//! [`ProvisionOutcome`], and an existing role is reported rather than
//! treated as an error.

use flightlog_common::types::quote_identifier;
use serde::{Deserialize, Serialize};
use sqlx::{Error as SqlxError, PgPool};
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::IngestError;

/// SQLSTATE raised by `CREATE ROLE` for an existing role.
const DUPLICATE_OBJECT: &str = "42710";

/// Privileges granted to a provisioned user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisionRole {
    /// Read and write every table
    #[default]
    #[serde(rename = "readWrite")]
    ReadWrite,
    /// Read every table
    #[serde(rename = "read")]
    Read,
}

impl ProvisionRole {
    /// Predefined Postgres roles (14+) that implement this role.
    fn granted_roles(self) -> &'static [&'static str] {
        match self {
            ProvisionRole::ReadWrite => &["pg_read_all_data", "pg_write_all_data"],
            ProvisionRole::Read => &["pg_read_all_data"],
        }
    }
}

impl FromStr for ProvisionRole {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readWrite" => Ok(ProvisionRole::ReadWrite),
            "read" => Ok(ProvisionRole::Read),
            other => Err(IngestError::config(format!(
                "Unknown provisioning role '{}'. Expected 'readWrite' or 'read'",
                other
            ))),
        }
    }
}

impl fmt::Display for ProvisionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionRole::ReadWrite => write!(f, "readWrite"),
            ProvisionRole::Read => write!(f, "read"),
        }
    }
}

/// A user to provision. `label` is the configuration name the credentials
/// were read under.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    pub label: String,
    pub username: String,
    pub password: String,
}

impl UserCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            label: username.clone(),
            username,
            password: password.into(),
        }
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("label", &self.label)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
    Failed(String),
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionOutcome::Created => write!(f, "created"),
            ProvisionOutcome::AlreadyExists => write!(f, "already exists"),
            ProvisionOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Render `value` as a single-quoted SQL string literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn is_duplicate_object(error: &SqlxError) -> bool {
    if let SqlxError::Database(db_err) = error {
        return db_err.code().as_deref() == Some(DUPLICATE_OBJECT);
    }
    false
}

/// Statements that create `credentials` with `role` on `database`.
fn provisioning_statements(
    database: &str,
    credentials: &UserCredentials,
    role: ProvisionRole,
) -> Result<Vec<String>, IngestError> {
    let user = quote_identifier(&credentials.username)?;
    let database = quote_identifier(database)?;

    let mut statements = vec![
        format!(
            "CREATE ROLE {} LOGIN PASSWORD {}",
            user,
            quote_literal(&credentials.password)
        ),
        format!("GRANT CONNECT ON DATABASE {} TO {}", database, user),
    ];
    statements.extend(
        role.granted_roles()
            .iter()
            .map(|granted| format!("GRANT {} TO {}", granted, user)),
    );

    Ok(statements)
}

/// Name of the database `pool` is connected to.
pub async fn current_database(pool: &PgPool) -> Result<String, IngestError> {
    Ok(sqlx::query_scalar("SELECT current_database()")
        .fetch_one(pool)
        .await?)
}

/// Create one login role. The statements run in a single transaction, so a
/// failed grant leaves no half-provisioned role behind.
#[tracing::instrument(skip(pool, credentials), fields(username = %credentials.username))]
pub async fn create_user(
    pool: &PgPool,
    database: &str,
    credentials: &UserCredentials,
    role: ProvisionRole,
) -> ProvisionOutcome {
    let statements = match provisioning_statements(database, credentials, role) {
        Ok(statements) => statements,
        Err(e) => return ProvisionOutcome::Failed(e.to_string()),
    };

    let result: Result<(), SqlxError> = async {
        let mut tx = pool.begin().await?;
        for statement in &statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await
    }
    .await;

    match result {
        Ok(()) => ProvisionOutcome::Created,
        Err(e) if is_duplicate_object(&e) => ProvisionOutcome::AlreadyExists,
        Err(e) => ProvisionOutcome::Failed(e.to_string()),
    }
}

/// Provision `users` in order, logging each outcome.
pub async fn create_users(
    pool: &PgPool,
    database: &str,
    users: &[UserCredentials],
    role: ProvisionRole,
) -> Vec<(String, ProvisionOutcome)> {
    let mut outcomes = Vec::with_capacity(users.len());

    for credentials in users {
        let outcome = create_user(pool, database, credentials, role).await;
        match &outcome {
            ProvisionOutcome::Created => {
                info!(username = %credentials.username, %role, "User created")
            }
            ProvisionOutcome::AlreadyExists => {
                info!(username = %credentials.username, "User already exists")
            }
            ProvisionOutcome::Failed(reason) => {
                warn!(username = %credentials.username, %reason, "Failed to create user")
            }
        }
        outcomes.push((credentials.username.clone(), outcome));
    }

    outcomes
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("readWrite".parse::<ProvisionRole>().unwrap(), ProvisionRole::ReadWrite);
        assert_eq!("read".parse::<ProvisionRole>().unwrap(), ProvisionRole::Read);
        assert!("ReadWrite".parse::<ProvisionRole>().is_err());
        assert_eq!(ProvisionRole::default(), ProvisionRole::ReadWrite);
        assert_eq!(ProvisionRole::Read.to_string(), "read");
    }

    #[test]
    fn test_password_is_escaped() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal("plain"), "'plain'");
    }

    #[test]
    fn test_statements_for_read_write_role() {
        let creds = UserCredentials::new("loader", "pa'ss");

        let statements =
            provisioning_statements("flightlog", &creds, ProvisionRole::ReadWrite).unwrap();

        assert_eq!(
            statements,
            vec![
                "CREATE ROLE \"loader\" LOGIN PASSWORD 'pa''ss'",
                "GRANT CONNECT ON DATABASE \"flightlog\" TO \"loader\"",
                "GRANT pg_read_all_data TO \"loader\"",
                "GRANT pg_write_all_data TO \"loader\"",
            ]
        );
    }

    #[test]
    fn test_read_role_gets_no_write_grant() {
        let creds = UserCredentials::new("analyst", "x");

        let statements = provisioning_statements("flightlog", &creds, ProvisionRole::Read).unwrap();

        assert!(statements.iter().all(|s| !s.contains("pg_write_all_data")));
    }

    #[test]
    fn test_invalid_username_is_rejected() {
        let creds = UserCredentials::new("bad\"name", "x");
        assert!(provisioning_statements("flightlog", &creds, ProvisionRole::Read).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = UserCredentials::new("analyst", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(ProvisionOutcome::AlreadyExists.to_string(), "already exists");
        assert_eq!(
            ProvisionOutcome::Failed("permission denied".into()).to_string(),
            "failed: permission denied"
        );
    }
}
