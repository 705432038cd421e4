use std::collections::HashMap;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// A named, already-resolved target cluster.
///
/// This is the *resolved* shape: parsing a kubeconfig YAML file into one of
/// these is the job of an external collaborator (spec.md §1's kube-config
/// parsing is explicitly out of scope). What lands here is what a loader
/// would hand the engine once `current-context` / cluster / user references
/// have all been followed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context {
    /// Short, human-facing name, e.g. "prod-us-east".
    pub short_name: String,
    pub cluster: Cluster,
    pub user: User,
    /// Default namespace for operations that don't specify one.
    pub namespace: Option<String>,
}

impl Context {
    pub fn new(short_name: impl Into<String>, cluster: Cluster, user: User) -> Self {
        Self {
            short_name: short_name.into(),
            cluster,
            user,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// CA trust material: either a path to read at connect time, or inline data
/// (typically base64-decoded PEM from a kubeconfig's `*-data` field).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrustMaterial {
    Path(String),
    Inline(Vec<u8>),
    /// Trust whatever the system already trusts (no cluster-specific CA).
    SystemDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cluster {
    pub name: String,
    pub server: String,
    pub ca: TrustMaterial,
}

impl Cluster {
    pub fn new(name: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server: server.into(),
            ca: TrustMaterial::SystemDefault,
        }
    }

    pub fn with_ca(mut self, ca: TrustMaterial) -> Self {
        self.ca = ca;
        self
    }
}

/// Client credential material, one of the four shapes a kubeconfig `user`
/// entry can hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthConfig {
    None,
    Basic {
        username: String,
        password: SecretStringEq,
    },
    ClientCertificate {
        cert: TrustMaterial,
        key: TrustMaterial,
    },
    Exec(ExecConfig),
}

/// Child-process credential plugin configuration (the `user.exec` stanza).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    pub name: String,
    pub auth: AuthConfig,
}

impl User {
    pub fn new(name: impl Into<String>, auth: AuthConfig) -> Self {
        Self { name: name.into(), auth }
    }
}

/// `secrecy::SecretString` doesn't implement `Eq`/`Hash` (by design — it
/// shouldn't be used as a map key or compared by value in logs), but
/// `Context` needs to be hashable to key the engine's `cluster_loops` map.
/// Wrap it so the comparison is over the exposed bytes, used only for this
/// identity purpose, never logged.
#[derive(Debug, Clone)]
pub struct SecretStringEq(pub SecretString);

impl PartialEq for SecretStringEq {
    fn eq(&self, other: &Self) -> bool {
        use secrecy::ExposeSecret;
        self.0.expose_secret() == other.0.expose_secret()
    }
}
impl Eq for SecretStringEq {}
impl std::hash::Hash for SecretStringEq {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use secrecy::ExposeSecret;
        self.0.expose_secret().hash(state)
    }
}

impl From<&str> for SecretStringEq {
    fn from(s: &str) -> Self {
        SecretStringEq(SecretString::from(s.to_owned()))
    }
}
impl From<String> for SecretStringEq {
    fn from(s: String) -> Self {
        SecretStringEq(SecretString::from(s))
    }
}
