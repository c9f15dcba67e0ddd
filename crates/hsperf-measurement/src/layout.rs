//! Working-directory layout.
//!
//! ```text
//! <prefix>/server/tgen/{tgen.graphml.xml, tgen.log}
//! <prefix>/server/tor/{torrc, tor.log, torctl.log, data/, hs/hostname}
//! <prefix>/client/tgen/{tgen.graphml.xml, tgen.log}
//! <prefix>/client/tor/{torrc, tor.log, torctl.log, data/}
//! ```

use hsperf_common::{Result, Role, ResultExt};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Layout {
    prefix: PathBuf,
}

impl Layout {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn role_dir(&self, role: Role) -> PathBuf {
        self.prefix.join(role.subdir())
    }

    pub fn tgen_config(&self, role: Role) -> PathBuf {
        self.role_dir(role).join("tgen.graphml.xml")
    }

    pub fn tgen_log(&self, role: Role) -> PathBuf {
        self.role_dir(role).join("tgen.log")
    }

    pub fn torrc(&self, role: Role) -> PathBuf {
        self.role_dir(role).join("torrc")
    }

    pub fn tor_log(&self, role: Role) -> PathBuf {
        self.role_dir(role).join("tor.log")
    }

    /// Control-event log written by the logger for this service.
    pub fn control_log(&self, role: Role) -> PathBuf {
        self.role_dir(role).join("torctl.log")
    }

    pub fn data_dir(&self, role: Role) -> PathBuf {
        self.role_dir(role).join("data")
    }

    /// Private service-identity directory; removed after every run.
    pub fn hs_dir(&self) -> PathBuf {
        self.role_dir(Role::ServerControl).join("hs")
    }

    /// File whose first line is the published endpoint address.
    pub fn hostname_file(&self) -> PathBuf {
        self.hs_dir().join("hostname")
    }

    /// Create every role directory.
    pub fn create_all(&self) -> Result<()> {
        for role in Role::ALL {
            let dir = self.role_dir(role);
            create_private_dir(&dir)
                .context(format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Create `path` and its parents; the leaf is owner-only on unix.
pub(crate) fn create_private_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}
