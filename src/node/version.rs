use std::fmt;

use crate::ProvisionError;
use crate::Result;

/// MariaDB server version as reported by `mysqld --version`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
}

impl ServerVersion {
    pub const fn new(
        major: u32,
        minor: u32,
    ) -> Self {
        Self { major, minor }
    }

    /// Parse the first `<major>.<minor>` pair following `Ver`.
    ///
    /// `mysqld  Ver 10.6.12-MariaDB-log for Linux on x86_64 (MariaDB Server)`
    pub fn parse(output: &str) -> Result<Self> {
        let unknown = || ProvisionError::UnknownVersion(output.trim().to_string());

        let after_ver = output
            .split_once("Ver ")
            .map(|(_, rest)| rest)
            .unwrap_or(output);
        let token = after_ver
            .split_whitespace()
            .find(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .ok_or_else(unknown)?;

        let mut parts = token.split(|c: char| !c.is_ascii_digit());
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(unknown)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(unknown)?;

        Ok(Self { major, minor })
    }

    /// `mariadb-install-db` replaced `mysql_install_db` in 10.4
    pub fn has_mariadb_install_db(&self) -> bool {
        *self >= ServerVersion::new(10, 4)
    }

    /// Partitioning grammar is only exercised from 10.4 on
    pub fn supports_partitioning_rqg(&self) -> bool {
        *self >= ServerVersion::new(10, 4)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:02}{:02}", self.major, self.minor)
    }
}
