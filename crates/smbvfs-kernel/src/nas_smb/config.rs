//! Mount configuration from dotenv text.
//!
//! ```text
//! NAS_SMB_MOUNTS=home,media
//! NAS_SMB_HOME_HOST=nas.lan
//! NAS_SMB_HOME_SHARE=users
//! NAS_SMB_HOME_USERNAME=alice
//! NAS_SMB_HOME_PASSWORD=...
//! NAS_SMB_MEDIA_HOST=nas.lan
//! NAS_SMB_MEDIA_SHARE=media
//! NAS_SMB_MEDIA_GUEST=true
//! NAS_SMB_MEDIA_REMOTE_DIR=/movies/
//! NAS_SMB_MEDIA_READ_ONLY=true
//! ```
//!
//! The text is parsed with `dotenvy`'s reader iterator; the process
//! environment is never touched.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use secrecy::SecretString;
use smbvfs_media::agents_path::SECRETS_DIR;
use tracing::warn;

use super::error::{NasSmbError, NasSmbErrorCode, NasSmbResult};
use super::models::{DEFAULT_PORT, MountConfig};

/// Comma-separated list of mount ids.
pub const MOUNTS_KEY: &str = "NAS_SMB_MOUNTS";

/// Allowed mount directory names.
pub const MOUNT_NAME_PATTERN: &str = "^[a-z0-9][a-z0-9_-]{0,31}$";

/// Parse dotenv text into key/value pairs. Malformed lines are skipped.
pub fn parse_env_text(text: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for item in dotenvy::from_read_iter(text.as_bytes()) {
        match item {
            Ok((key, value)) => {
                values.insert(key, value);
            }
            // The line may hold a credential; log nothing from it
            Err(_) => warn!("skipping malformed mount config line"),
        }
    }
    values
}

/// Load mounts from dotenv text.
pub fn load_from_env_text(text: &str) -> NasSmbResult<Vec<MountConfig>> {
    load_from_map(&parse_env_text(text))
}

/// Load mounts from already-parsed key/value pairs.
///
/// An absent or blank `NAS_SMB_MOUNTS` means no mounts.
pub fn load_from_map(values: &HashMap<String, String>) -> NasSmbResult<Vec<MountConfig>> {
    let mounts_raw = values.get(MOUNTS_KEY).map(|s| s.trim()).unwrap_or("");
    if mounts_raw.is_empty() {
        return Ok(Vec::new());
    }

    let name_re = Regex::new(MOUNT_NAME_PATTERN)
        .map_err(|e| NasSmbError::invalid_config(format!("mount name pattern: {e}")))?;

    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut out = Vec::new();

    for id in mounts_raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id_lower = id.to_lowercase();
        if !seen_ids.insert(id_lower.clone()) {
            continue;
        }

        let mount = load_one(values, id, &id_lower, &name_re)?;
        if !seen_names.insert(mount.mount_name.clone()) {
            return Err(NasSmbError::invalid_config(format!(
                "mount name '{}' is used by more than one mount",
                mount.mount_name
            )));
        }
        out.push(mount);
    }
    Ok(out)
}

fn load_one(
    values: &HashMap<String, String>,
    id: &str,
    id_lower: &str,
    name_re: &Regex,
) -> NasSmbResult<MountConfig> {
    let prefix = format!("NAS_SMB_{}_", id.to_uppercase());
    let get = |key: &str| {
        values
            .get(&format!("{prefix}{key}"))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let host = get("HOST").ok_or_else(|| {
        NasSmbError::invalid_config(format!("missing {prefix}HOST for mount '{id_lower}'"))
    })?;
    let share = get("SHARE").ok_or_else(|| {
        NasSmbError::invalid_config(format!("missing {prefix}SHARE for mount '{id_lower}'"))
    })?;
    let port = get("PORT")
        .and_then(|p| p.parse::<u16>().ok())
        .filter(|p| *p != 0)
        .unwrap_or(DEFAULT_PORT);

    let guest = get("GUEST").and_then(parse_strict_bool).unwrap_or(false);
    let username = get("USERNAME");
    let password = get("PASSWORD");
    if !guest && (username.is_none() || password.is_none()) {
        return Err(NasSmbError::new(
            NasSmbErrorCode::MissingCredentials,
            format!(
                "missing credentials for mount '{id_lower}' \
                 (set {prefix}USERNAME/{prefix}PASSWORD or {prefix}GUEST=true)"
            ),
        ));
    }

    let remote_dir = normalize_remote_dir(get("REMOTE_DIR"))?;
    let mount_name = get("MOUNT_NAME").unwrap_or(id_lower).to_string();
    if !name_re.is_match(&mount_name) || mount_name == SECRETS_DIR {
        return Err(NasSmbError::invalid_config(format!(
            "invalid mount name '{mount_name}' (expected {MOUNT_NAME_PATTERN}, not '{SECRETS_DIR}')"
        )));
    }

    let read_only = get("READ_ONLY").and_then(parse_strict_bool).unwrap_or(false);

    Ok(MountConfig {
        id: id_lower.to_string(),
        mount_name,
        host: host.to_string(),
        port,
        domain: get("DOMAIN").map(str::to_string),
        username: username.map(str::to_string),
        password: password.map(|p| SecretString::from(p.to_string())),
        share: share.to_string(),
        remote_dir,
        guest,
        read_only,
    })
}

/// Exactly `true` or `false`; anything else is no answer.
fn parse_strict_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Strip surrounding slashes; reject empty, `.` and `..` segments.
pub fn normalize_remote_dir(raw: Option<&str>) -> NasSmbResult<String> {
    let trimmed = raw.map(str::trim).unwrap_or("").trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(NasSmbError::invalid_config(format!(
            "invalid remote dir (path traversal): '{}'",
            raw.unwrap_or("")
        )));
    }
    Ok(trimmed.to_string())
}
