//! MySQL container support via testcontainers.

use testcontainers::Image;
use testcontainers::core::{ContainerPort, WaitFor};

/// Port of the X Protocol listener inside the container.
pub const X_PROTOCOL_PORT: u16 = 33060;

/// MySQL server container image with the X Plugin enabled.
#[derive(Debug, Clone)]
pub struct MysqlContainer {
    /// Root password.
    pub password: String,
    /// Container tag (version).
    pub tag: String,
    /// Schema created at startup, if any.
    pub database: Option<String>,
}

impl Default for MysqlContainer {
    fn default() -> Self {
        Self {
            password: "Password123!".to_string(),
            tag: "8.4".to_string(),
            database: None,
        }
    }
}

impl MysqlContainer {
    /// Create a new MySQL container configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the container tag (MySQL version).
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Create a schema when the container first starts.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

impl Image for MysqlContainer {
    fn name(&self) -> &str {
        "mysql"
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![
            WaitFor::message_on_stderr("X Plugin ready for connections"),
            WaitFor::seconds(2),
        ]
    }

    fn env_vars(
        &self,
    ) -> impl IntoIterator<
        Item = (
            impl Into<std::borrow::Cow<'_, str>>,
            impl Into<std::borrow::Cow<'_, str>>,
        ),
    > {
        let mut vars = vec![("MYSQL_ROOT_PASSWORD", self.password.as_str())];
        if let Some(database) = &self.database {
            vars.push(("MYSQL_DATABASE", database.as_str()));
        }
        vars
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &[ContainerPort::Tcp(3306), ContainerPort::Tcp(X_PROTOCOL_PORT)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_env_vars_include_database() {
        let image = MysqlContainer::new().with_password("pw").with_database("library");
        let vars: Vec<(String, String)> = image
            .env_vars()
            .into_iter()
            .map(|(k, v)| {
                let k: Cow<'_, str> = k.into();
                let v: Cow<'_, str> = v.into();
                (k.into_owned(), v.into_owned())
            })
            .collect();
        assert!(vars.contains(&("MYSQL_ROOT_PASSWORD".into(), "pw".into())));
        assert!(vars.contains(&("MYSQL_DATABASE".into(), "library".into())));
        assert_eq!(image.expose_ports().len(), 2);
    }
}
