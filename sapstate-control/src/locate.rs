use crate::error::{ControlError, ControlResult};
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;

/// Last resort when `sapcontrol` is neither configured nor on `PATH`.
pub const SAPCONTROL_FALLBACK_PATH: &str = "/usr/sap/hostctrl/exe/sapcontrol";

/// Kernel directory that usually holds `sldreg` for a system.
pub fn sldreg_kernel_path(sid: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("/usr/sap/{sid}/SYS/exe/run/sldreg"))
}

/// Resolve an executable: the configured path wins, then `PATH`, then the
/// given fallbacks in order.
pub fn find_executable(
    name: &str,
    configured: Option<&Utf8Path>,
    fallbacks: &[Utf8PathBuf],
) -> ControlResult<Utf8PathBuf> {
    let mut searched = Vec::new();

    if let Some(path) = configured {
        if is_executable(path) {
            return Ok(path.to_path_buf());
        }
        searched.push(path.to_string());
    }

    if let Ok(path_var) = std::env::var("PATH") {
        for dir in path_var.split(':').filter(|d| !d.is_empty()) {
            let candidate = Utf8Path::new(dir).join(name);
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }
        searched.push("$PATH".to_string());
    }

    for path in fallbacks {
        if is_executable(path) {
            return Ok(path.clone());
        }
        searched.push(path.to_string());
    }

    Err(ControlError::ExecutableNotFound {
        name: name.to_string(),
        searched: searched.join(", "),
    })
}

#[cfg(unix)]
fn is_executable(path: &Utf8Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Utf8Path) -> bool {
    path.is_file()
}

/// Short host name of this machine (without domain).
pub fn local_short_hostname() -> Option<String> {
    let raw = fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .or_else(|| std::env::var("HOSTNAME").ok())?;
    let short = short_hostname(raw.trim());
    (!short.is_empty()).then(|| short.to_string())
}

/// `s4h-app.my.domain` -> `s4h-app`.
pub fn short_hostname(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}
