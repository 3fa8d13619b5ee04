//! Command line interface for the winrs binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use winrs::config::{AuthMethod, WinRmConfig};

/// winrs - run a command on a Windows host over WinRM
#[derive(Parser, Debug, Clone)]
#[command(name = "winrs")]
#[command(author = "winrs Contributors")]
#[command(version)]
#[command(about = "Run a command on a Windows host over WinRM", long_about = None)]
pub struct Cli {
    /// Command line to run on the remote host
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Path to a TOML configuration file; flags override its values
    #[arg(short = 'c', long, env = "WINRS_CONFIG")]
    pub config: Option<PathBuf>,

    /// WinRM host
    #[arg(short = 'H', long)]
    pub hostname: Option<String>,

    /// WinRM port (5985, or 5986 with --https)
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Use HTTPS
    #[arg(long)]
    pub https: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// CA certificate bundle (PEM)
    #[arg(long)]
    pub cacert: Option<PathBuf>,

    /// Client certificate (PEM) for certificate authentication
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Client key (PEM) for certificate authentication
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Username, optionally DOMAIN\user or user@domain
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Password
    #[arg(long, env = "WINRM_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Authentication method
    #[arg(short = 'a', long)]
    pub auth: Option<AuthArg>,

    /// Seal messages with the given protocol (ntlm, credssp, kerberos)
    #[arg(long, value_name = "PROTOCOL")]
    pub encryption: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Treat a dropped connection while polling as the end of the command
    #[arg(long)]
    pub allow_timeout: bool,

    /// Run the command as a PowerShell script
    #[arg(long)]
    pub powershell: bool,

    /// Do not forward local stdin to the command
    #[arg(long)]
    pub no_stdin: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Authentication methods selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthArg {
    Basic,
    Certificate,
    Ntlm,
    Kerberos,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    /// The remote command line
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Merge the flags over a loaded configuration.
    pub fn apply(&self, mut config: WinRmConfig) -> WinRmConfig {
        if let Some(host) = &self.hostname {
            config.host = host.clone();
        }
        if self.port.is_some() {
            config.port = self.port;
        }
        config.https |= self.https;
        config.insecure |= self.insecure;
        if self.cacert.is_some() {
            config.ca_cert = self.cacert.clone();
        }
        if self.cert.is_some() {
            config.cert = self.cert.clone();
        }
        if self.key.is_some() {
            config.key = self.key.clone();
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if self.password.is_some() {
            config.password = self.password.clone();
        }
        if let Some(auth) = self.auth {
            config.auth = match auth {
                AuthArg::Basic => AuthMethod::Basic,
                AuthArg::Certificate => AuthMethod::Certificate,
                AuthArg::Ntlm => AuthMethod::Ntlm,
                AuthArg::Kerberos => AuthMethod::Kerberos,
            };
        }
        if let Some(protocol) = &self.encryption {
            config.auth = AuthMethod::Encrypted(protocol.clone());
        }
        if let Some(seconds) = self.timeout {
            config.timeout = Duration::from_secs(seconds);
        }
        config.parameters.allow_timeout |= self.allow_timeout;
        config
    }
}
