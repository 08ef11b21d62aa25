//! Named profiles from the shared AWS credentials and config files.
//!
//! `~/.aws/credentials` holds `[name]` sections, `~/.aws/config` holds
//! `[profile name]` (and `[default]`). Either file may carry keys; the
//! credentials file wins. `AWS_SHARED_CREDENTIALS_FILE` and `AWS_CONFIG_FILE`
//! relocate them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::utils::errors::{Result, SyncError};

pub const DEFAULT_PROFILE: &str = "default";

/// Credentials and region read from one profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub region: Option<String>,
}

type Sections = HashMap<String, HashMap<String, String>>;

/// Locations of the two shared files.
#[derive(Debug, Clone)]
pub struct SharedFiles {
    pub credentials: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl SharedFiles {
    /// Paths from the environment, falling back to `~/.aws/`.
    pub fn from_env() -> Self {
        let aws_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(|home| PathBuf::from(home).join(".aws"));

        Self {
            credentials: std::env::var_os("AWS_SHARED_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .or_else(|| aws_dir.as_ref().map(|d| d.join("credentials"))),
            config: std::env::var_os("AWS_CONFIG_FILE")
                .map(PathBuf::from)
                .or_else(|| aws_dir.as_ref().map(|d| d.join("config"))),
        }
    }

    /// Load `name`. `Ok(None)` when neither file has keys for it.
    pub fn load(&self, name: &str) -> Result<Option<ProfileCredentials>> {
        let credentials = read_sections(self.credentials.as_deref())?;
        let config = read_sections(self.config.as_deref())?;

        let config_section = if name == DEFAULT_PROFILE {
            config.get(DEFAULT_PROFILE)
        } else {
            config.get(&format!("profile {}", name))
        };
        let credentials_section = credentials.get(name);

        let lookup = |key: &str| {
            credentials_section
                .and_then(|s| s.get(key))
                .or_else(|| config_section.and_then(|s| s.get(key)))
                .filter(|v| !v.is_empty())
                .cloned()
        };

        match (lookup("aws_access_key_id"), lookup("aws_secret_access_key")) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(Some(ProfileCredentials {
                access_key_id,
                secret_access_key,
                session_token: lookup("aws_session_token"),
                region: config_section.and_then(|s| s.get("region")).cloned(),
            })),
            _ => Ok(None),
        }
    }
}

/// Resolve the profile to use.
///
/// An explicitly named profile must exist. Without one, `AWS_PROFILE` or
/// `default` is tried and may be missing.
pub fn resolve(explicit: Option<&str>, files: &SharedFiles) -> Result<Option<ProfileCredentials>> {
    match explicit {
        Some(name) => files.load(name)?.map(Some).ok_or_else(|| {
            SyncError::Config(format!(
                "AWS profile '{}' not found in shared credentials or config file",
                name
            ))
        }),
        None => {
            let name = std::env::var("AWS_PROFILE").unwrap_or_else(|_| DEFAULT_PROFILE.to_string());
            files.load(&name)
        }
    }
}

fn read_sections(path: Option<&Path>) -> Result<Sections> {
    let Some(path) = path else {
        return Ok(Sections::new());
    };
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse_sections(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sections::new()),
        Err(e) => Err(SyncError::Config(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// INI subset used by the AWS files: `[section]`, `key = value`, `#`/`;` comments.
fn parse_sections(text: &str) -> Sections {
    let mut sections = Sections::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        if let (Some(section), Some((key, value))) = (&current, line.split_once('=')) {
            if let Some(entries) = sections.get_mut(section) {
                entries.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREDENTIALS: &str = "\
[default]
aws_access_key_id = AKIDDEFAULT
aws_secret_access_key = defaultsecret

# archive account
[archive]
aws_access_key_id=AKIDARCHIVE
aws_secret_access_key=archivesecret
aws_session_token = token123
";

    const CONFIG: &str = "\
[default]
region = us-east-1

[profile archive]
region = eu-west-1

[profile  sso-only]
region = ap-south-1
aws_access_key_id = AKIDCONFIG
aws_secret_access_key = configsecret
";

    fn files(dir: &Path) -> SharedFiles {
        let credentials = dir.join("credentials");
        let config = dir.join("config");
        std::fs::write(&credentials, CREDENTIALS).unwrap();
        std::fs::write(&config, CONFIG).unwrap();
        SharedFiles {
            credentials: Some(credentials),
            config: Some(config),
        }
    }

    #[test]
    fn test_parse_sections() {
        let sections = parse_sections(CONFIG);
        assert_eq!(sections["profile archive"]["region"], "eu-west-1");
        assert_eq!(sections["profile sso-only"]["aws_access_key_id"], "AKIDCONFIG");
    }

    #[test]
    fn test_named_profile_with_region_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let profile = files(dir.path()).load("archive").unwrap().unwrap();
        assert_eq!(profile.access_key_id, "AKIDARCHIVE");
        assert_eq!(profile.secret_access_key, "archivesecret");
        assert_eq!(profile.session_token.as_deref(), Some("token123"));
        assert_eq!(profile.region.as_deref(), Some("eu-west-1"));
    }

    #[test]
    fn test_default_profile_counts_as_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let profile = files(dir.path()).load(DEFAULT_PROFILE).unwrap().unwrap();
        assert_eq!(profile.access_key_id, "AKIDDEFAULT");
        assert_eq!(profile.region.as_deref(), Some("us-east-1"));
        assert_eq!(profile.session_token, None);
    }

    #[test]
    fn test_keys_in_config_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let profile = files(dir.path()).load("sso-only").unwrap().unwrap();
        assert_eq!(profile.access_key_id, "AKIDCONFIG");
    }

    #[test]
    fn test_missing_explicit_profile_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = resolve(Some("nope"), &files(dir.path()));
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_missing_files_yield_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let files = SharedFiles {
            credentials: Some(dir.path().join("absent")),
            config: None,
        };
        assert_eq!(files.load(DEFAULT_PROFILE).unwrap(), None);
    }
}
