use sapstate_types::{ObservedDestination, Secret, SldDestination};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Connection parameter that differs between desired and observed config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DestinationField {
    Host,
    Port,
    User,
    Https,
    Password,
}

impl fmt::Display for DestinationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DestinationField::Host => "host",
            DestinationField::Port => "port",
            DestinationField::User => "user",
            DestinationField::Https => "https",
            DestinationField::Password => "password",
        };
        f.write_str(s)
    }
}

/// Why the destination config has to be (re)written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReason {
    Missing,
    /// The existing file could not be parsed.
    Unreadable,
    Overwrite,
    Mismatch(Vec<DestinationField>),
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateReason::Missing => f.write_str("no existing configuration"),
            UpdateReason::Unreadable => f.write_str("existing configuration cannot be parsed"),
            UpdateReason::Overwrite => f.write_str("overwrite requested"),
            UpdateReason::Mismatch(fields) => {
                let names: Vec<String> = fields.iter().map(|x| x.to_string()).collect();
                write!(f, "differs in {}", names.join(", "))
            }
        }
    }
}

/// Fields of `observed` that do not match `desired`.
///
/// The password only takes part when the backend was able to read it back.
pub fn diff_destination(
    desired: &SldDestination,
    observed: &ObservedDestination,
) -> Vec<DestinationField> {
    let mut out = Vec::new();
    if observed.host.as_deref() != Some(desired.host.as_str()) {
        out.push(DestinationField::Host);
    }
    if observed.port != Some(desired.port) {
        out.push(DestinationField::Port);
    }
    if observed.user.as_deref() != Some(desired.user.as_str()) {
        out.push(DestinationField::User);
    }
    if observed.https != Some(desired.https) {
        out.push(DestinationField::Https);
    }
    if let Some(pw) = &observed.password
        && pw != &desired.password
    {
        out.push(DestinationField::Password);
    }
    out
}

/// Decide whether a write is needed. `None` means the config already converged.
pub fn plan_update(
    desired: &SldDestination,
    observed: Option<&ObservedDestination>,
    overwrite: bool,
) -> Option<UpdateReason> {
    let Some(observed) = observed else {
        return Some(UpdateReason::Missing);
    };
    let fields = diff_destination(desired, observed);
    if !fields.is_empty() {
        return Some(UpdateReason::Mismatch(fields));
    }
    if overwrite {
        return Some(UpdateReason::Overwrite);
    }
    None
}

/// Parse the output of `sldreg -showconnect <file>`.
///
/// Lines look like `  host_param='sol.my.domain'`; anything before the key is
/// ignored and single quotes around the value are stripped.
pub fn parse_showconnect(output: &str) -> ObservedDestination {
    let mut obs = ObservedDestination::default();
    for line in output.lines() {
        for key in ["host_param", "https_param", "port_param", "user_param"] {
            let Some(idx) = line.find(key) else {
                continue;
            };
            let Some((_, value)) = line[idx..].split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('\'');
            match key {
                "host_param" => obs.host = Some(value.to_string()),
                "port_param" => obs.port = value.parse().ok(),
                "user_param" => obs.user = Some(value.to_string()),
                "https_param" => obs.https = Some(value.eq_ignore_ascii_case("y")),
                _ => {}
            }
        }
    }
    obs
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("line {line}: expected key=value")]
    MalformedLine { line: usize },

    #[error("line {line}: unknown key '{key}'")]
    UnknownKey { line: usize, key: String },

    #[error("line {line}: invalid {key} value '{value}'")]
    InvalidValue {
        line: usize,
        key: &'static str,
        value: String,
    },

    #[error("{field} must not contain line breaks")]
    LineBreak { field: &'static str },
}

const FILE_KEYS: [&str; 5] = ["host", "port", "user", "password", "https"];

/// Render the plain destination file used by the `file` backend.
///
/// Keys are written in a fixed order so identical input always yields
/// identical bytes.
pub fn render_destination_file(dest: &SldDestination) -> Result<String, CodecError> {
    for (field, value) in [
        ("host", dest.host.as_str()),
        ("user", dest.user.as_str()),
        ("password", dest.password.expose()),
    ] {
        if value.contains(['\n', '\r']) {
            return Err(CodecError::LineBreak { field });
        }
    }
    let https = if dest.https { "y" } else { "n" };
    Ok(format!(
        "host={}\nport={}\nuser={}\npassword={}\nhttps={}\n",
        dest.host,
        dest.port,
        dest.user,
        dest.password.expose(),
        https
    ))
}

/// Parse a file written by [`render_destination_file`]. Values are taken
/// verbatim; blank lines and `#` comments are skipped.
pub fn parse_destination_file(text: &str) -> Result<ObservedDestination, CodecError> {
    let mut obs = ObservedDestination::default();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or(CodecError::MalformedLine { line: line_no })?;
        let Some(key) = FILE_KEYS.iter().find(|k| **k == key).copied() else {
            return Err(CodecError::UnknownKey {
                line: line_no,
                key: key.to_string(),
            });
        };
        let invalid = || CodecError::InvalidValue {
            line: line_no,
            key,
            value: value.to_string(),
        };
        match key {
            "host" => obs.host = Some(value.to_string()),
            "user" => obs.user = Some(value.to_string()),
            "password" => obs.password = Some(Secret::new(value)),
            "port" => obs.port = Some(value.parse().map_err(|_| invalid())?),
            "https" => {
                obs.https = Some(match value {
                    "y" => true,
                    "n" => false,
                    _ => return Err(invalid()),
                })
            }
            _ => {}
        }
    }
    Ok(obs)
}

/// SHA-256 over the non-secret connection parameters, hex encoded.
pub fn destination_fingerprint(dest: &SldDestination) -> String {
    let mut hasher = Sha256::new();
    hasher.update(dest.host.as_bytes());
    hasher.update(b"\n");
    hasher.update(dest.port.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(dest.user.as_bytes());
    hasher.update(b"\n");
    hasher.update(if dest.https { b"y" } else { b"n" });
    hex::encode(hasher.finalize())
}
