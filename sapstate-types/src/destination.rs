use crate::secret::Secret;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Desired SLD connection, written into `slddest.cfg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SldDestination {
    pub config_path: Utf8PathBuf,
    pub user: String,
    pub password: Secret,
    pub host: String,
    pub port: u16,
    pub https: bool,
}

impl SldDestination {
    pub fn new(
        config_path: impl Into<Utf8PathBuf>,
        user: impl Into<String>,
        password: Secret,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            user: user.into(),
            password,
            host: host.into(),
            port,
            https: true,
        }
    }

    /// Endpoint label without credentials, e.g. `https://sol.my.domain:50000`.
    pub fn endpoint(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Connection parameters read back from an existing destination config.
///
/// Fields the backend could not observe are `None`; `password` in particular
/// is only visible to backends that store it in clear.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedDestination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https: Option<bool>,

    #[serde(skip)]
    pub password: Option<Secret>,
}

/// Ordered log files inspected for the registration success marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogFileSet(Vec<Utf8PathBuf>);

impl LogFileSet {
    pub fn new(paths: Vec<Utf8PathBuf>) -> Self {
        Self(paths)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utf8Path> {
        self.0.iter().map(|p| p.as_path())
    }
}

impl From<Vec<Utf8PathBuf>> for LogFileSet {
    fn from(paths: Vec<Utf8PathBuf>) -> Self {
        Self(paths)
    }
}

impl<'a> IntoIterator for &'a LogFileSet {
    type Item = &'a Utf8PathBuf;
    type IntoIter = std::slice::Iter<'a, Utf8PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
