//! Statically-typed TOML schemas for the project config
//! (`.kanuka/config.toml`) and the per-machine user config. Validation
//! happens at load time; writers emit top-level tables in declaration
//! order (project, users, devices).

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::fsio;

/// Directory committed to version control, holding the wrapping artefacts.
pub const PROJECT_DIR: &str = ".kanuka";

/// Basename of the project config inside [`PROJECT_DIR`].
pub const CONFIG_BASENAME: &str = "config.toml";

/// Basename of the per-machine user config, relative to the user's
/// config directory.
pub const USER_CONFIG_BASENAME: &str = "config.toml";

/// Application directory name under the user's config and data dirs.
pub const APP_DIR: &str = "kanuka";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectSection,
    /// user uuid -> email. BTreeMap so per-user iteration is in
    /// lexicographic UUID order.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
    /// device uuid -> device record.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub user_uuid: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>) -> Self {
        ProjectConfig {
            project: ProjectSection {
                uuid: Uuid::new_v4().to_string(),
                name: name.into(),
            },
            users: BTreeMap::new(),
            devices: BTreeMap::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: ProjectConfig =
            toml::from_str(text).map_err(|e| Error::InvalidProjectConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Internal(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.project.uuid.is_empty() {
            return Err(Error::InvalidProjectConfig("empty project uuid".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for email in self.users.values() {
            if !seen.insert(email.as_str()) {
                return Err(Error::InvalidProjectConfig(format!(
                    "duplicate email {email} in users table"
                )));
            }
        }
        for (device_uuid, device) in &self.devices {
            if !self.users.contains_key(&device.user_uuid) {
                return Err(Error::InvalidProjectConfig(format!(
                    "device {device_uuid} references unknown user {}",
                    device.user_uuid
                )));
            }
        }
        Ok(())
    }

    /// Add a user, enforcing email uniqueness across the table.
    pub fn add_user(&mut self, user_uuid: &str, email: &str) -> Result<()> {
        if self.users.values().any(|e| e == email) {
            return Err(Error::DuplicateUser(email.to_string()));
        }
        self.users.insert(user_uuid.to_string(), email.to_string());
        Ok(())
    }

    /// Record a device for a user; returns the new device uuid.
    pub fn add_device(&mut self, user_uuid: &str, email: &str, name: &str) -> Result<String> {
        validate_device_name(name)?;
        let device_uuid = Uuid::new_v4().to_string();
        self.devices.insert(
            device_uuid.clone(),
            DeviceEntry {
                user_uuid: user_uuid.to_string(),
                email: email.to_string(),
                name: name.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(device_uuid)
    }

    pub fn remove_user(&mut self, user_uuid: &str) -> bool {
        let existed = self.users.remove(user_uuid).is_some();
        self.devices.retain(|_, d| d.user_uuid != user_uuid);
        existed
    }

    pub fn email_of(&self, user_uuid: &str) -> Option<&str> {
        self.users.get(user_uuid).map(String::as_str)
    }

    /// Resolve a user by uuid or email.
    pub fn resolve_user(&self, needle: &str) -> Option<String> {
        if self.users.contains_key(needle) {
            return Some(needle.to_string());
        }
        self.users
            .iter()
            .find(|(_, email)| email.as_str() == needle)
            .map(|(uuid, _)| uuid.clone())
    }

    /// Device uuid registered for a (user, device name) pair, if any.
    pub fn device_for(&self, user_uuid: &str, device_name: &str) -> Option<String> {
        self.devices
            .iter()
            .find(|(_, d)| d.user_uuid == user_uuid && d.name == device_name)
            .map(|(uuid, _)| uuid.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub user: UserSection,
    /// project uuid -> naming this machine uses for that project.
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSection {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_device_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRef {
    pub device_name: String,
    pub project_name: String,
}

impl UserConfig {
    fn fresh() -> Self {
        UserConfig {
            user: UserSection {
                uuid: Uuid::new_v4().to_string(),
                default_device_name: None,
            },
            projects: BTreeMap::new(),
        }
    }

    /// Load the user config, creating one with a fresh uuid on first use.
    /// The uuid is created once and never changed afterwards.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::fresh();
        config.save(path)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fsio::read_to_string(path)?;
        let config: UserConfig =
            toml::from_str(&text).map_err(|e| Error::InvalidUserConfig(e.to_string()))?;
        if config.user.uuid.is_empty() {
            return Err(Error::InvalidUserConfig("empty user uuid".into()));
        }
        if let Some(name) = &config.user.default_device_name {
            validate_device_name(name)?;
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fsio::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Internal(e.to_string()))?;
        fsio::write_atomic(path, text.as_bytes())
    }

    /// Remember how this machine names itself within a project.
    pub fn remember_project(&mut self, project_uuid: &str, project_name: &str, device_name: &str) {
        self.projects.insert(
            project_uuid.to_string(),
            ProjectRef {
                device_name: device_name.to_string(),
                project_name: project_name.to_string(),
            },
        );
    }

    pub fn device_name_for(&self, project_uuid: &str) -> Option<&str> {
        self.projects
            .get(project_uuid)
            .map(|p| p.device_name.as_str())
    }
}

/// Device names are alphanumeric plus `-` and `_`, and non-empty.
pub fn validate_device_name(name: &str) -> Result<()> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidDeviceName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_config_round_trip() {
        let mut config = ProjectConfig::new("demo");
        config.add_user("u-1", "a@example.com").unwrap();
        config.add_device("u-1", "a@example.com", "laptop").unwrap();
        let text = config.to_toml().unwrap();
        let back = ProjectConfig::parse(&text).unwrap();
        assert_eq!(back.project.uuid, config.project.uuid);
        assert_eq!(back.users.get("u-1").map(String::as_str), Some("a@example.com"));
        assert_eq!(back.devices.len(), 1);
    }

    #[test]
    fn table_order_is_stable() {
        let mut config = ProjectConfig::new("demo");
        config.add_user("u-1", "a@example.com").unwrap();
        config.add_device("u-1", "a@example.com", "laptop").unwrap();
        let text = config.to_toml().unwrap();
        let project_at = text.find("[project]").unwrap();
        let users_at = text.find("[users]").unwrap();
        let devices_at = text.find("[devices").unwrap();
        assert!(project_at < users_at && users_at < devices_at);
    }

    #[test]
    fn duplicate_email_rejected() {
        let mut config = ProjectConfig::new("demo");
        config.add_user("u-1", "a@example.com").unwrap();
        assert!(matches!(
            config.add_user("u-2", "a@example.com"),
            Err(Error::DuplicateUser(_))
        ));
    }

    #[test]
    fn parse_rejects_dangling_device() {
        let text = r#"
[project]
uuid = "p-1"
name = "demo"

[devices.d-1]
user_uuid = "ghost"
email = "g@example.com"
name = "laptop"
created_at = "2026-01-01T00:00:00Z"
"#;
        assert!(matches!(
            ProjectConfig::parse(text),
            Err(Error::InvalidProjectConfig(_))
        ));
    }

    #[test]
    fn device_names() {
        validate_device_name("work-laptop_2").unwrap();
        assert!(validate_device_name("").is_err());
        assert!(validate_device_name("bad name").is_err());
        assert!(validate_device_name("bad/name").is_err());
    }

    #[test]
    fn user_config_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let first = UserConfig::load_or_create(&path).unwrap();
        let second = UserConfig::load_or_create(&path).unwrap();
        assert_eq!(first.user.uuid, second.user.uuid);
    }

    #[test]
    fn resolve_user_by_email() {
        let mut config = ProjectConfig::new("demo");
        config.add_user("u-1", "a@example.com").unwrap();
        assert_eq!(config.resolve_user("a@example.com").as_deref(), Some("u-1"));
        assert_eq!(config.resolve_user("u-1").as_deref(), Some("u-1"));
        assert_eq!(config.resolve_user("nobody"), None);
    }
}
