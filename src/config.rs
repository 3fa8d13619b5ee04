//! Client configuration.
//!
//! - [`Endpoint`]: where to connect and how to secure the connection
//! - [`Parameters`]: per-client WS-Management request settings
//! - [`AuthMethod`] and [`Credentials`]: who we are and how we prove it
//! - [`WinRmConfig`]: all of the above loaded from a TOML file

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::TransportDecorator;

/// Default WinRM HTTP port
pub const DEFAULT_WINRM_PORT: u16 = 5985;

/// Default WinRM HTTPS port
pub const DEFAULT_WINRM_SSL_PORT: u16 = 5986;

/// Default HTTP response timeout in seconds
pub const DEFAULT_TIMEOUT: u64 = 60;

/// Time an HTTP request gets beyond the WS-Man operation timeout, so the
/// service's OperationTimeout fault arrives before the client gives up
pub const OPERATION_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Default maximum envelope size requested from the server
pub const DEFAULT_ENVELOPE_SIZE: u32 = 153600;

/// Default WS-Man operation timeout
pub const DEFAULT_OPERATION_TIMEOUT: &str = "PT60S";

/// Default locale
pub const DEFAULT_LOCALE: &str = "en-US";

// ============================================================================
// Endpoint
// ============================================================================

/// A WinRM endpoint.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    /// Target hostname or IP address
    pub host: String,
    /// WinRM port (5985 for HTTP, 5986 for HTTPS)
    pub port: u16,
    /// Use HTTPS instead of HTTP
    pub https: bool,
    /// Skip TLS certificate verification
    pub insecure: bool,
    /// PEM encoded CA bundle used to verify the server
    pub ca_cert: Option<Vec<u8>>,
    /// PEM encoded client certificate
    pub cert: Option<Vec<u8>>,
    /// PEM encoded client private key
    pub key: Option<Vec<u8>>,
    /// Name to verify the server certificate against, if not `host`
    pub tls_server_name: Option<String>,
    /// HTTP response timeout
    pub timeout: Duration,
}

impl Endpoint {
    /// Plain HTTP endpoint on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_WINRM_PORT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            ..Default::default()
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable HTTPS, moving to the HTTPS port if still on the HTTP default
    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        if https && self.port == DEFAULT_WINRM_PORT {
            self.port = DEFAULT_WINRM_SSL_PORT;
        }
        self
    }

    /// Skip certificate verification
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Trust the given PEM CA bundle
    pub fn with_ca_cert(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_cert = Some(pem.into());
        self
    }

    /// Present the given PEM client certificate and key
    pub fn with_client_cert(mut self, cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        self.cert = Some(cert.into());
        self.key = Some(key.into());
        self
    }

    /// Verify the server certificate against `name`
    pub fn with_tls_server_name(mut self, name: impl Into<String>) -> Self {
        self.tls_server_name = Some(name.into());
        self
    }

    /// Set the HTTP response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The WinRM service URL.
    pub fn url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}:{}/wsman", scheme, self.host, self.port)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("https", &self.https)
            .field("insecure", &self.insecure)
            .field("ca_cert", &self.ca_cert.as_ref().map(Vec::len))
            .field("client_cert", &self.cert.is_some())
            .field("tls_server_name", &self.tls_server_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Socket level overrides for the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialOptions {
    /// TCP connect timeout
    #[serde(with = "humantime_serde", default = "default_dial_timeout")]
    pub connect_timeout: Duration,
    /// TCP keep-alive interval
    #[serde(with = "humantime_serde", default = "default_dial_timeout")]
    pub keep_alive: Duration,
    /// Connect to this address instead of resolving the endpoint host
    #[serde(default)]
    pub resolve: Option<SocketAddr>,
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            connect_timeout: default_dial_timeout(),
            keep_alive: default_dial_timeout(),
            resolve: None,
        }
    }
}

/// WS-Management settings shared by every request of a client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Operation timeout as an ISO-8601 duration
    pub timeout: String,
    /// Locale sent in every header
    pub locale: String,
    /// Maximum envelope size the server may reply with
    pub envelope_size: u32,
    /// Treat a dropped or timed out connection during output polling as the
    /// end of the command. Useful for commands that shut the host down.
    pub allow_timeout: bool,
    /// Options sent with the shell creation request
    pub shell_options: IndexMap<String, String>,
    /// Socket level overrides
    pub dial: Option<DialOptions>,
    /// Replaces the transport selected from the auth method
    #[serde(skip)]
    pub transport_decorator: Option<TransportDecorator>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self::new(DEFAULT_OPERATION_TIMEOUT, DEFAULT_LOCALE, DEFAULT_ENVELOPE_SIZE)
    }
}

impl Parameters {
    /// Create parameters with the default shell options.
    pub fn new(timeout: impl Into<String>, locale: impl Into<String>, envelope_size: u32) -> Self {
        let mut shell_options = IndexMap::new();
        shell_options.insert("WINRS_NOPROFILE".to_string(), "FALSE".to_string());
        shell_options.insert("WINRS_CODEPAGE".to_string(), "65001".to_string());

        Self {
            timeout: timeout.into(),
            locale: locale.into(),
            envelope_size,
            allow_timeout: false,
            shell_options,
            dial: None,
            transport_decorator: None,
        }
    }

    /// Tolerate connection timeouts while polling output
    pub fn with_allow_timeout(mut self, allow: bool) -> Self {
        self.allow_timeout = allow;
        self
    }

    /// Add or replace a shell creation option
    pub fn with_shell_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.shell_options.insert(name.into(), value.into());
        self
    }

    /// Override socket level behaviour
    pub fn with_dial(mut self, dial: DialOptions) -> Self {
        self.dial = Some(dial);
        self
    }

    /// Replace the transport selected from the auth method
    pub fn with_transport_decorator(mut self, decorator: TransportDecorator) -> Self {
        self.transport_decorator = Some(decorator);
        self
    }

    /// Operation timeout as a duration, if it parses.
    pub fn operation_timeout(&self) -> Option<Duration> {
        parse_iso8601_duration(&self.timeout)
    }

    /// Deadline for one HTTP request.
    ///
    /// The service holds an idle Receive for the whole operation timeout, so
    /// the deadline is at least that plus [`OPERATION_TIMEOUT_MARGIN`]. A
    /// longer `response_timeout` wins.
    pub fn http_timeout(&self, response_timeout: Duration) -> Duration {
        match self.operation_timeout() {
            Some(operation) => response_timeout.max(operation + OPERATION_TIMEOUT_MARGIN),
            None => response_timeout,
        }
    }
}

/// Parse an ISO-8601 duration such as `PT60S`, `PT1M30.5S` or `P1DT2H`.
///
/// Years, months and weeks are not accepted.
pub fn parse_iso8601_duration(value: &str) -> Option<Duration> {
    let rest = value.strip_prefix('P')?;
    let (date, time) = rest.split_once('T').unwrap_or((rest, ""));

    let mut seconds = 0f64;
    let date_seen = accumulate(date, &[('D', 86_400.0)], &mut seconds)?;
    let time_seen = accumulate(time, &[('H', 3_600.0), ('M', 60.0), ('S', 1.0)], &mut seconds)?;
    if !date_seen && !time_seen {
        return None;
    }
    Duration::try_from_secs_f64(seconds).ok()
}

/// Add the `<number><unit>` groups of `part` to `seconds`. Units must
/// appear in the order given.
fn accumulate(part: &str, units: &[(char, f64)], seconds: &mut f64) -> Option<bool> {
    let mut number = String::new();
    let mut next_unit = 0;
    let mut seen = false;
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let offset = units[next_unit..].iter().position(|(unit, _)| *unit == c)?;
        let (_, scale) = units[next_unit + offset];
        *seconds += number.parse::<f64>().ok()? * scale;
        number.clear();
        next_unit += offset + 1;
        seen = true;
    }
    number.is_empty().then_some(seen)
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters")
            .field("timeout", &self.timeout)
            .field("locale", &self.locale)
            .field("envelope_size", &self.envelope_size)
            .field("allow_timeout", &self.allow_timeout)
            .field("shell_options", &self.shell_options)
            .field("dial", &self.dial)
            .field("transport_decorator", &self.transport_decorator.is_some())
            .finish()
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// How the client authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// HTTP Basic authentication
    Basic,
    /// TLS client certificate (HTTPS only)
    Certificate,
    /// NTLM negotiated at the HTTP layer, payload sent in the clear
    Ntlm,
    /// Kerberos/SPNEGO
    Kerberos,
    /// NTLM with message level encryption, tagged by sub-protocol
    Encrypted(String),
}

impl Default for AuthMethod {
    fn default() -> Self {
        AuthMethod::Basic
    }
}

/// Username and password.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Username, optionally `DOMAIN\user` or `user@domain`
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Split the username into `(user, domain)`.
    pub fn user_and_domain(&self) -> (String, String) {
        if let Some((domain, user)) = self.username.split_once('\\') {
            (user.to_string(), domain.to_string())
        } else if let Some((user, domain)) = self.username.split_once('@') {
            (user.to_string(), domain.to_string())
        } else {
            (self.username.clone(), String::new())
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// File configuration
// ============================================================================

/// Client settings loaded from TOML.
///
/// ```toml
/// host = "winserver.example.com"
/// https = true
/// insecure = true
/// username = "Administrator"
/// auth = "basic"
/// timeout = "90s"
///
/// [parameters]
/// timeout = "PT120S"
///
/// [parameters.shell_options]
/// WINRS_CODEPAGE = "437"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WinRmConfig {
    /// Target host
    pub host: String,
    /// Port, defaults by scheme
    pub port: Option<u16>,
    /// Use HTTPS
    pub https: bool,
    /// Skip certificate verification
    pub insecure: bool,
    /// CA bundle path
    pub ca_cert: Option<PathBuf>,
    /// Client certificate path
    pub cert: Option<PathBuf>,
    /// Client key path
    pub key: Option<PathBuf>,
    /// Certificate name override
    pub tls_server_name: Option<String>,
    /// HTTP response timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Authentication method
    pub auth: AuthMethod,
    /// Username
    pub username: String,
    /// Password. Falls back to the `WINRM_PASSWORD` environment variable.
    pub password: Option<String>,
    /// Request parameters
    pub parameters: Parameters,
}

impl Default for WinRmConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            https: false,
            insecure: false,
            ca_cert: None,
            cert: None,
            key: None,
            tls_server_name: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            auth: AuthMethod::default(),
            username: String::new(),
            password: None,
            parameters: Parameters::default(),
        }
    }
}

impl WinRmConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))
    }

    /// Build the endpoint, reading certificate files from disk.
    pub fn endpoint(&self) -> Result<Endpoint> {
        if self.host.is_empty() {
            return Err(Error::InvalidConfig("host is required".to_string()));
        }
        let default_port = if self.https {
            DEFAULT_WINRM_SSL_PORT
        } else {
            DEFAULT_WINRM_PORT
        };

        Ok(Endpoint {
            host: self.host.clone(),
            port: self.port.unwrap_or(default_port),
            https: self.https,
            insecure: self.insecure,
            ca_cert: read_optional(self.ca_cert.as_deref(), "CA cert")?,
            cert: read_optional(self.cert.as_deref(), "client cert")?,
            key: read_optional(self.key.as_deref(), "client key")?,
            tls_server_name: self.tls_server_name.clone(),
            timeout: self.timeout,
        })
    }

    /// Credentials from the file, with the password falling back to the environment.
    pub fn credentials(&self) -> Credentials {
        let password = self
            .password
            .clone()
            .or_else(|| std::env::var("WINRM_PASSWORD").ok())
            .unwrap_or_default();
        Credentials::new(self.username.clone(), password)
    }

    /// Shared parameters handle
    pub fn parameters(&self) -> Arc<Parameters> {
        Arc::new(self.parameters.clone())
    }
}

fn read_optional(path: Option<&Path>, what: &str) -> Result<Option<Vec<u8>>> {
    path.map(|p| {
        std::fs::read(p).map_err(|e| {
            Error::InvalidConfig(format!("Failed to read {} '{}': {}", what, p.display(), e))
        })
    })
    .transpose()
}
