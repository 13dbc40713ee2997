//! Recognizes virtual paths that live on a remote mount.
//!
//! Remote files appear under `.agents/nas_smb/<mount>/<rel>`. The `secrets`
//! directory and per-mount `.mount.json` descriptors sit in the same tree but
//! are local, so they never parse as remote.

/// Directory under the agents root that holds remote mounts.
pub const NAS_SMB_DIR: &str = "nas_smb";

/// Agents root directory name.
pub const AGENTS_DIR: &str = ".agents";

/// Local-only directory for credentials.
pub const SECRETS_DIR: &str = "secrets";

/// Local-only mount descriptor file name.
pub const MOUNT_METADATA_FILE: &str = ".mount.json";

/// A path on a remote mount.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualPath {
    pub mount_name: String,
    /// Share-relative path with `/` separators. Empty at the mount root.
    pub rel_path: String,
}

/// Split a path into segments, resolving `.` and `..` lexically.
///
/// Both separators are accepted. `None` when a `..` climbs above the start.
pub fn normalize_segments(path: &str) -> Option<Vec<&str>> {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split(['/', '\\']) {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop()?;
            }
            s => out.push(s),
        }
    }
    Some(out)
}

impl VirtualPath {
    /// Parse segments below the agents root: `nas_smb`, mount, rel...
    pub fn from_segments(segs: &[&str]) -> Option<Self> {
        let [dir, mount, rel @ ..] = segs else {
            return None;
        };
        if *dir != NAS_SMB_DIR || mount.trim().is_empty() {
            return None;
        }
        if mount.eq_ignore_ascii_case(SECRETS_DIR) {
            return None;
        }
        if rel
            .last()
            .is_some_and(|last| last.eq_ignore_ascii_case(MOUNT_METADATA_FILE))
        {
            return None;
        }
        Some(Self {
            mount_name: (*mount).to_string(),
            rel_path: rel.join("/"),
        })
    }

    /// Parse a path relative to the agents root's parent, such as
    /// `.agents/nas_smb/home/movies/a.mp4`.
    pub fn parse(path: &str) -> Option<Self> {
        let segs = normalize_segments(path.trim())?;
        match segs.as_slice() {
            [root, rest @ ..] if *root == AGENTS_DIR => Self::from_segments(rest),
            _ => None,
        }
    }

    /// Like [`parse`](Self::parse) but requires a path inside the mount.
    pub fn parse_file(path: &str) -> Option<Self> {
        Self::parse(path).filter(|p| !p.rel_path.is_empty())
    }

    pub fn is_mount_root(&self) -> bool {
        self.rel_path.is_empty()
    }

    /// Final segment of the relative path.
    pub fn file_name(&self) -> Option<&str> {
        self.rel_path.rsplit('/').next().filter(|s| !s.is_empty())
    }

    /// The agents-relative form this path parses from.
    pub fn to_agents_path(&self) -> String {
        if self.rel_path.is_empty() {
            format!("{AGENTS_DIR}/{NAS_SMB_DIR}/{}", self.mount_name)
        } else {
            format!("{AGENTS_DIR}/{NAS_SMB_DIR}/{}/{}", self.mount_name, self.rel_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vp(mount: &str, rel: &str) -> VirtualPath {
        VirtualPath {
            mount_name: mount.into(),
            rel_path: rel.into(),
        }
    }

    #[test]
    fn parses_files_and_mount_roots() {
        assert_eq!(
            VirtualPath::parse(".agents/nas_smb/home/movies/a.mp4"),
            Some(vp("home", "movies/a.mp4"))
        );
        assert_eq!(VirtualPath::parse(".agents/nas_smb/home"), Some(vp("home", "")));
        assert_eq!(VirtualPath::parse_file(".agents/nas_smb/home"), None);
        assert_eq!(
            VirtualPath::parse_file(".agents/nas_smb/home/a.mp4"),
            Some(vp("home", "a.mp4"))
        );
    }

    #[test]
    fn local_entries_are_not_remote() {
        assert_eq!(VirtualPath::parse(".agents/nas_smb/secrets/home.env"), None);
        assert_eq!(VirtualPath::parse(".agents/nas_smb/secrets"), None);
        assert_eq!(VirtualPath::parse(".agents/nas_smb/home/.mount.json"), None);
        assert_eq!(VirtualPath::parse(".agents/nas_smb/home/sub/.mount.json"), None);
        assert_eq!(VirtualPath::parse(".agents/nas_smb"), None);
        assert_eq!(VirtualPath::parse(".agents/other/home/a"), None);
        assert_eq!(VirtualPath::parse("nas_smb/home/a"), None);
    }

    #[test]
    fn normalizes_before_matching() {
        assert_eq!(
            VirtualPath::parse("./.agents//nas_smb/home/x/../a.mp4"),
            Some(vp("home", "a.mp4"))
        );
        assert_eq!(
            VirtualPath::parse(".agents\\nas_smb\\home\\b.mkv"),
            Some(vp("home", "b.mkv"))
        );
        // Climbing out of the mount lands on a local path.
        assert_eq!(VirtualPath::parse(".agents/nas_smb/home/../secrets/x.env"), None);
    }

    #[test]
    fn climbing_above_the_start_never_matches() {
        assert_eq!(normalize_segments("../a"), None);
        assert_eq!(normalize_segments("a/../../b"), None);
        assert_eq!(normalize_segments("a/./b/.."), Some(vec!["a"]));
        assert_eq!(VirtualPath::parse("../../.agents/nas_smb/home/a.mp4"), None);
        assert_eq!(VirtualPath::parse(".agents/../../.agents/nas_smb/home/a.mp4"), None);
    }

    #[test]
    fn file_name_and_round_trip() {
        let p = vp("home", "movies/a.mp4");
        assert_eq!(p.file_name(), Some("a.mp4"));
        assert_eq!(VirtualPath::parse(&p.to_agents_path()), Some(p));
        assert_eq!(vp("home", "").file_name(), None);
    }
}
