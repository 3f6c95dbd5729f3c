//! Database dump after a successful run
//!
//! Shells out to `pg_dump -Fc -Z 9`. Connection parameters are passed as
//! flags and the password through `PGPASSWORD`, so it never shows up in the
//! process list.

use crate::config::SecretString;
use crate::domain::errors::PgMaskError;
use crate::domain::Result;
use secrecy::ExposeSecret;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use tokio::process::Command;
use tokio_postgres::config::Host;

const PG_DUMP: &str = "pg_dump";

/// Arguments and password for one `pg_dump` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpCommand {
    pub args: Vec<OsString>,
    password: Option<String>,
}

impl DumpCommand {
    /// Build the invocation from a connection string
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the connection string cannot be parsed.
    pub fn new(connection_string: &SecretString, file: &Path) -> Result<Self> {
        let config: tokio_postgres::Config = connection_string
            .expose_secret()
            .as_ref()
            .parse()
            .map_err(|e| {
                PgMaskError::Configuration(format!("Invalid PostgreSQL connection string: {e}"))
            })?;

        let mut args: Vec<OsString> = vec!["-Fc".into(), "-Z".into(), "9".into()];
        if let Some(dbname) = config.get_dbname() {
            push_flag(&mut args, "-d", dbname);
        }
        if let Some(user) = config.get_user() {
            push_flag(&mut args, "-U", user);
        }
        if let Some(Host::Tcp(host)) = config.get_hosts().first() {
            push_flag(&mut args, "-h", host);
        }
        if let Some(port) = config.get_ports().first() {
            push_flag(&mut args, "-p", port.to_string());
        }
        push_flag(&mut args, "-f", file);

        let password = config
            .get_password()
            .map(|p| String::from_utf8_lossy(p).into_owned());

        Ok(Self { args, password })
    }

    /// Run `pg_dump` and wait for it
    ///
    /// # Errors
    ///
    /// Returns an error if the binary cannot be started or exits non-zero.
    pub async fn run(&self) -> Result<()> {
        let mut command = Command::new(PG_DUMP);
        command.args(&self.args);
        if let Some(password) = &self.password {
            command.env("PGPASSWORD", password);
        }

        tracing::info!(args = ?self.args, "Creating database dump");
        let output = command
            .output()
            .await
            .map_err(|e| PgMaskError::Io(format!("Failed to start {PG_DUMP}: {e}")))?;

        if !output.status.success() {
            return Err(PgMaskError::Other(format!(
                "{PG_DUMP} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tracing::info!("Database dump written");
        Ok(())
    }
}

fn push_flag(args: &mut Vec<OsString>, flag: &str, value: impl AsRef<OsStr>) {
    args.push(flag.into());
    args.push(value.as_ref().to_os_string());
}
