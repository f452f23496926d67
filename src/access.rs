// restoretool/src/access.rs
use sqlx::mysql::MySqlConnectOptions;
use sqlx::{Connection, MySqlConnection};
use std::fs;
use std::path::Path;

use crate::config::{AdminConfig, DatabaseConfig};
use crate::errors::{RestoreError, Result};

/// Schema-scoped rights of the application account. Broad DDL/DML plus
/// routine/event/trigger rights, deliberately short of administrative grants.
const APPLICATION_PRIVILEGES: &str = "SELECT, INSERT, UPDATE, DELETE, CREATE, DROP, REFERENCES, \
     INDEX, ALTER, CREATE TEMPORARY TABLES, LOCK TABLES, EXECUTE, CREATE VIEW, SHOW VIEW, \
     CREATE ROUTINE, ALTER ROUTINE, EVENT, TRIGGER";

/// Grants and revokes database account privileges for the application
/// account and its companion read-only account.
pub struct AccessManager<'a> {
    config: &'a DatabaseConfig,
    admin: &'a AdminConfig,
    append_secret_path: Option<&'a Path>,
}

impl<'a> AccessManager<'a> {
    /// `append_secret_path` points at an optional deployment-wide secret
    /// whose contents are appended to the read-only account's password.
    pub fn new(
        config: &'a DatabaseConfig,
        admin: &'a AdminConfig,
        append_secret_path: Option<&'a Path>,
    ) -> Self {
        AccessManager {
            config,
            admin,
            append_secret_path,
        }
    }

    /// Grants the application account its privilege set at `host_pattern`,
    /// then always (re)grants the read-only account at the wildcard host.
    /// Granting to the administrative account itself is a no-op success.
    pub async fn grant(&self, host_pattern: &str) -> Result<()> {
        if self.admin.username == self.config.username {
            return Ok(());
        }

        let mut conn = self.admin_connection().await?;

        let statement = build_application_grant(
            &self.config.database,
            &self.config.username,
            &self.config.password,
            host_pattern,
        );
        sqlx::query(&statement)
            .execute(&mut conn)
            .await
            .map_err(|e| RestoreError::Privilege(e.to_string()))?;
        println!(
            "✓ Granted application privileges to '{}'@'{}'",
            self.config.username, host_pattern
        );

        self.grant_read_only(&mut conn).await
    }

    async fn grant_read_only(&self, conn: &mut MySqlConnection) -> Result<()> {
        let statement = build_read_only_grant(
            &self.config.database,
            &self.config.ro_username,
            &self.read_only_password(),
        );
        sqlx::query(&statement)
            .execute(conn)
            .await
            .map_err(|e| RestoreError::Privilege(e.to_string()))?;
        println!(
            "✓ Granted read-only privileges to '{}'@'%'",
            self.config.ro_username
        );
        Ok(())
    }

    /// Best-effort removal of both accounts. An account that never existed
    /// is not an error.
    pub async fn revoke(&self, host_pattern: &str) -> Result<()> {
        let mut conn = self.admin_connection().await?;
        let _ = sqlx::query(&build_drop_user(&self.config.username, host_pattern))
            .execute(&mut conn)
            .await;
        let _ = sqlx::query(&build_drop_user(&self.config.ro_username, "%"))
            .execute(&mut conn)
            .await;
        Ok(())
    }

    fn read_only_password(&self) -> String {
        let mut password = self.config.ro_password.clone();
        if let Some(path) = self.append_secret_path {
            if let Ok(secret) = fs::read_to_string(path) {
                password.push_str(&secret);
            }
        }
        password
    }

    async fn admin_connection(&self) -> Result<MySqlConnection> {
        let options = MySqlConnectOptions::new()
            .host(&self.admin.host)
            .username(&self.admin.username)
            .password(&self.admin.password);
        Ok(MySqlConnection::connect_with(&options).await?)
    }
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub(crate) fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn build_application_grant(database: &str, username: &str, password: &str, host: &str) -> String {
    format!(
        "GRANT {} ON {}.* TO {}@{} IDENTIFIED BY {}",
        APPLICATION_PRIVILEGES,
        quote_identifier(database),
        quote_identifier(username),
        quote_identifier(host),
        quote_string(password),
    )
}

fn build_read_only_grant(database: &str, ro_username: &str, ro_password: &str) -> String {
    format!(
        "GRANT SELECT, EXECUTE ON {}.* TO {}@{} IDENTIFIED BY {} REQUIRE SSL",
        quote_identifier(database),
        quote_identifier(ro_username),
        quote_identifier("%"),
        quote_string(ro_password),
    )
}

fn build_drop_user(username: &str, host: &str) -> String {
    format!(
        "DROP USER {}@{}",
        quote_identifier(username),
        quote_identifier(host)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_config() -> DatabaseConfig {
        DatabaseConfig {
            host: "db.internal".into(),
            username: "app".into(),
            password: "secret".into(),
            database: "trade".into(),
            ro_username: "viewer".into(),
            ro_password: "readpass".into(),
        }
    }

    #[test]
    fn test_application_grant_statement() {
        let statement = build_application_grant("trade", "app", "secret", "10.0.%");
        assert!(statement.starts_with("GRANT SELECT, INSERT, UPDATE, DELETE"));
        assert!(statement.contains("TRIGGER ON `trade`.* TO `app`@`10.0.%` IDENTIFIED BY 'secret'"));
        assert!(!statement.contains("GRANT OPTION"));
        assert!(!statement.contains("SUPER"));
    }

    #[test]
    fn test_read_only_grant_requires_ssl() {
        let statement = build_read_only_grant("trade", "viewer", "readpass");
        assert_eq!(
            statement,
            "GRANT SELECT, EXECUTE ON `trade`.* TO `viewer`@`%` IDENTIFIED BY 'readpass' REQUIRE SSL"
        );
    }

    #[test]
    fn test_drop_user_statement() {
        assert_eq!(build_drop_user("app", "%"), "DROP USER `app`@`%`");
    }

    #[test]
    fn test_quoting_escapes_metacharacters() {
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(quote_string(r"p'a\ss"), r"'p\'a\\ss'");
    }

    #[test]
    fn test_read_only_password_appends_shared_secret() {
        let config = sample_config();
        let admin = AdminConfig {
            host: "db.internal".into(),
            username: "root".into(),
            password: String::new(),
        };

        let mut secret_file = tempfile::NamedTempFile::new().unwrap();
        write!(secret_file, "pepper").unwrap();

        let manager = AccessManager::new(&config, &admin, Some(secret_file.path()));
        assert_eq!(manager.read_only_password(), "readpasspepper");

        let without = AccessManager::new(&config, &admin, None);
        assert_eq!(without.read_only_password(), "readpass");
    }

    #[test]
    fn test_missing_secret_file_is_ignored() {
        let config = sample_config();
        let admin = AdminConfig {
            host: "db.internal".into(),
            username: "root".into(),
            password: String::new(),
        };
        let manager =
            AccessManager::new(&config, &admin, Some(Path::new("/nonexistent/append.key")));
        assert_eq!(manager.read_only_password(), "readpass");
    }
}
