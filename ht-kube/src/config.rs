//! Cluster client configuration discovery
//!
//! Order of precedence:
//! 1. an explicitly given kubeconfig file
//! 2. the in-cluster service account
//! 3. `$KUBECONFIG`, then `$HOME/.kube/config`
//!
//! Only the current context of a kubeconfig is used. Supported credentials
//! are bearer tokens (inline or file) and client certificates.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use ht_error::{HwTaggerError, Result};

/// Mount point of the pod service account
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Where the bearer token comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Inline(String),
    /// Re-read on every request, service account tokens rotate
    File(PathBuf),
}

impl TokenSource {
    pub fn token(&self) -> Result<String> {
        match self {
            Self::Inline(token) => Ok(token.clone()),
            Self::File(path) => fs::read_to_string(path)
                .map(|t| t.trim().to_string())
                .map_err(|source| HwTaggerError::FileRead {
                    path: path.clone(),
                    source,
                }),
        }
    }
}

/// Everything needed to build an API server client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Base URL, e.g. "https://10.96.0.1:443"
    pub server: String,
    pub ca_pem: Option<Vec<u8>>,
    /// Client certificate followed by its private key, PEM encoded
    pub identity_pem: Option<Vec<u8>>,
    pub token: Option<TokenSource>,
    pub insecure_skip_tls_verify: bool,
}

impl ClusterConfig {
    /// Discover credentials following the documented precedence
    pub fn discover(kubeconfig: Option<&Path>) -> Result<Self> {
        if let Some(path) = kubeconfig {
            return Self::from_kubeconfig(path);
        }

        match Self::in_cluster() {
            Ok(config) => Ok(config),
            Err(e) => {
                info!("{}", e);
                info!("Falling back to local Kubernetes client configuration");
                let path = default_kubeconfig_path().ok_or_else(|| {
                    HwTaggerError::Credentials("no kubeconfig location available".into())
                })?;
                Self::from_kubeconfig(&path)
            }
        }
    }

    /// Configuration of the pod's service account
    pub fn in_cluster() -> Result<Self> {
        let host = env::var("KUBERNETES_SERVICE_HOST").unwrap_or_default();
        let port = env::var("KUBERNETES_SERVICE_PORT").unwrap_or_default();
        Self::in_cluster_from(&host, &port, Path::new(SERVICE_ACCOUNT_DIR))
    }

    pub fn in_cluster_from(host: &str, port: &str, account_dir: &Path) -> Result<Self> {
        if host.is_empty() || port.is_empty() {
            return Err(HwTaggerError::Credentials(
                "unable to load in-cluster configuration, KUBERNETES_SERVICE_HOST and KUBERNETES_SERVICE_PORT must be defined".into(),
            ));
        }

        let token_path = account_dir.join("token");
        if !token_path.is_file() {
            return Err(HwTaggerError::Credentials(format!(
                "service account token {} not found",
                token_path.display()
            )));
        }
        let ca_path = account_dir.join("ca.crt");
        let ca_pem = read_file(&ca_path)?;

        // IPv6 service addresses need brackets
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };

        Ok(Self {
            server: format!("https://{}:{}", host, port),
            ca_pem: Some(ca_pem),
            identity_pem: None,
            token: Some(TokenSource::File(token_path)),
            insecure_skip_tls_verify: false,
        })
    }

    /// Configuration of a kubeconfig file's current context
    pub fn from_kubeconfig(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| HwTaggerError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let kubeconfig: Kubeconfig = serde_yaml::from_str(&content)
            .map_err(|e| HwTaggerError::Credentials(format!("{}: {}", path.display(), e)))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let config = kubeconfig.resolve(base_dir)?;
        info!("Using kubeconfig {} (server {})", path.display(), config.server);
        Ok(config)
    }
}

fn default_kubeconfig_path() -> Option<PathBuf> {
    if let Ok(paths) = env::var("KUBECONFIG") {
        if let Some(first) = env::split_paths(&paths).find(|p| !p.as_os_str().is_empty()) {
            return Some(first);
        }
    }
    dirs::home_dir().map(|home| home.join(".kube").join("config"))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| HwTaggerError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

fn decode_data(field: &str, data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| HwTaggerError::Credentials(format!("invalid base64 in {}: {}", field, e)))
}

/// Inline data wins over a file reference; relative files resolve against
/// the kubeconfig's directory
fn data_or_file(
    field: &str,
    data: Option<&String>,
    file: Option<&PathBuf>,
    base_dir: &Path,
) -> Result<Option<Vec<u8>>> {
    if let Some(data) = data {
        return decode_data(field, data).map(Some);
    }
    match file {
        Some(file) => read_file(&base_dir.join(file)).map(Some),
        None => Ok(None),
    }
}

// ============================================================================
// kubeconfig file format (subset)
// ============================================================================

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(rename = "current-context", default)]
    current_context: String,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    certificate_authority: Option<PathBuf>,
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    cluster: String,
    #[serde(default)]
    user: String,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    token: Option<String>,
    #[serde(rename = "tokenFile")]
    token_file: Option<PathBuf>,
    client_certificate: Option<PathBuf>,
    client_certificate_data: Option<String>,
    client_key: Option<PathBuf>,
    client_key_data: Option<String>,
}

impl Kubeconfig {
    fn resolve(&self, base_dir: &Path) -> Result<ClusterConfig> {
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == self.current_context)
            .ok_or_else(|| {
                HwTaggerError::Credentials(format!(
                    "current context {:?} not found",
                    self.current_context
                ))
            })?;
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.context.cluster)
            .ok_or_else(|| {
                HwTaggerError::Credentials(format!(
                    "cluster {:?} not found",
                    context.context.cluster
                ))
            })?;
        let empty = UserEntry::default();
        let user = self
            .users
            .iter()
            .find(|u| u.name == context.context.user)
            .map(|u| &u.user)
            .unwrap_or(&empty);

        let entry = &cluster.cluster;
        let ca_pem = data_or_file(
            "certificate-authority-data",
            entry.certificate_authority_data.as_ref(),
            entry.certificate_authority.as_ref(),
            base_dir,
        )?;

        let cert = data_or_file(
            "client-certificate-data",
            user.client_certificate_data.as_ref(),
            user.client_certificate.as_ref(),
            base_dir,
        )?;
        let key = data_or_file(
            "client-key-data",
            user.client_key_data.as_ref(),
            user.client_key.as_ref(),
            base_dir,
        )?;
        let identity_pem = match (cert, key) {
            (Some(mut cert), Some(key)) => {
                if !cert.ends_with(b"\n") {
                    cert.push(b'\n');
                }
                cert.extend_from_slice(&key);
                Some(cert)
            }
            (None, None) => None,
            _ => {
                return Err(HwTaggerError::Credentials(
                    "client certificate and key must be given together".into(),
                ))
            }
        };

        let token = match (&user.token, &user.token_file) {
            (Some(token), _) => Some(TokenSource::Inline(token.clone())),
            (None, Some(file)) => Some(TokenSource::File(base_dir.join(file))),
            (None, None) => None,
        };

        if token.is_none() && identity_pem.is_none() {
            warn!(
                "User {:?} has no token or client certificate, requests will be anonymous",
                context.context.user
            );
        }

        Ok(ClusterConfig {
            server: entry.server.trim_end_matches('/').to_string(),
            ca_pem,
            identity_pem,
            token,
            insecure_skip_tls_verify: entry.insecure_skip_tls_verify,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: admin@lab
clusters:
- name: lab
  cluster:
    server: https://10.0.0.1:6443/
    certificate-authority-data: LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0tCg==
- name: other
  cluster:
    server: https://other:6443
contexts:
- name: admin@lab
  context:
    cluster: lab
    user: admin
users:
- name: admin
  user:
    token: abc.def
"#;

    #[test]
    fn test_kubeconfig_current_context() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, KUBECONFIG).unwrap();

        let config = ClusterConfig::from_kubeconfig(&path).unwrap();
        assert_eq!(config.server, "https://10.0.0.1:6443");
        assert_eq!(
            config.ca_pem.as_deref(),
            Some(&b"-----BEGIN CERTIFICATE-----\n"[..])
        );
        assert_eq!(config.token, Some(TokenSource::Inline("abc.def".into())));
        assert!(config.identity_pem.is_none());
        assert!(!config.insecure_skip_tls_verify);
    }

    #[test]
    fn test_kubeconfig_client_certificate_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("client.crt"), "CERT").unwrap();
        fs::write(dir.path().join("client.key"), "KEY\n").unwrap();
        let path = dir.path().join("config");
        fs::write(
            &path,
            r#"
current-context: dev
clusters:
- name: dev
  cluster:
    server: https://127.0.0.1:6443
    insecure-skip-tls-verify: true
contexts:
- name: dev
  context:
    cluster: dev
    user: dev
users:
- name: dev
  user:
    client-certificate: client.crt
    client-key: client.key
"#,
        )
        .unwrap();

        let config = ClusterConfig::from_kubeconfig(&path).unwrap();
        assert_eq!(config.identity_pem.as_deref(), Some(&b"CERT\nKEY\n"[..]));
        assert!(config.insecure_skip_tls_verify);
        assert!(config.token.is_none());
    }

    #[test]
    fn test_kubeconfig_missing_context() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, KUBECONFIG.replace("current-context: admin@lab", "current-context: nope"))
            .unwrap();
        let err = ClusterConfig::from_kubeconfig(&path).unwrap_err();
        assert!(matches!(err, HwTaggerError::Credentials(_)));
    }

    #[test]
    fn test_in_cluster_from_service_account() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("token"), "sa-token\n").unwrap();
        fs::write(dir.path().join("ca.crt"), "CA").unwrap();

        let config = ClusterConfig::in_cluster_from("10.96.0.1", "443", dir.path()).unwrap();
        assert_eq!(config.server, "https://10.96.0.1:443");
        assert_eq!(config.ca_pem.as_deref(), Some(&b"CA"[..]));
        assert_eq!(config.token.unwrap().token().unwrap(), "sa-token");

        let v6 = ClusterConfig::in_cluster_from("fd00::1", "443", dir.path()).unwrap();
        assert_eq!(v6.server, "https://[fd00::1]:443");
    }

    #[test]
    fn test_in_cluster_requires_environment() {
        let dir = TempDir::new().unwrap();
        assert!(ClusterConfig::in_cluster_from("", "443", dir.path()).is_err());
        // token missing
        assert!(ClusterConfig::in_cluster_from("10.96.0.1", "443", dir.path()).is_err());
    }
}
