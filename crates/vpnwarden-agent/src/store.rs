// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::future::Future;

use thiserror::Error;
use vpnwarden_types::{ConnectionScope, VpnProfileConfig, VpnProfileState};

/// Environment variable the preshared key is handed to PowerShell through,
/// keeping it off the command line.
pub const PSK_ENV_VAR: &str = "VPNWARDEN_PSK";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not supported on this platform")]
    Unsupported,

    #[error("failed to run PowerShell: {0}")]
    Io(#[from] std::io::Error),

    #[error("PowerShell exited with status {code}: {stderr}")]
    Command { code: i32, stderr: String },

    #[error("failed to parse VPN connection output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The OS VPN connection store. `find` returns `Ok(None)` only when the
/// profile does not exist; any other failure is an error. `delete` is always
/// forced.
pub trait ProfileStore {
    fn find(
        &self,
        name: &str,
        scope: ConnectionScope,
    ) -> impl Future<Output = Result<Option<VpnProfileState>, StoreError>> + Send;
    fn create(
        &self,
        profile: &VpnProfileConfig,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
    fn delete(
        &self,
        name: &str,
        scope: ConnectionScope,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[cfg(windows)]
pub type CurrentStore = windows::PowerShellStore;

#[cfg(not(windows))]
pub type CurrentStore = StubStore;

/// Open the store for this platform. `powershell` is the interpreter path and
/// is ignored where no VPN client module exists.
#[cfg(windows)]
pub fn open(powershell: &str) -> CurrentStore {
    windows::PowerShellStore::new(powershell)
}

#[cfg(not(windows))]
pub fn open(_powershell: &str) -> CurrentStore {
    StubStore
}

// -- Script builders --

/// Escape a value for embedding inside a single-quoted PowerShell string.
pub fn escape(s: &str) -> String {
    s.replace('\'', "''")
}

fn scope_switch(scope: ConnectionScope) -> &'static str {
    match scope {
        ConnectionScope::AllUsers => " -AllUserConnection",
        ConnectionScope::CurrentUser => "",
    }
}

fn ps_bool(value: bool) -> &'static str {
    if value { "$true" } else { "$false" }
}

/// Look up one connection and print it as compact JSON. Prints nothing when
/// the connection does not exist; any other error escapes as a failure.
pub fn find_script(name: &str, scope: ConnectionScope) -> String {
    format!(
        "try {{ $c = Get-VpnConnection -Name '{name}'{scope} -ErrorAction Stop }} \
         catch {{ if ($_.CategoryInfo.Category -eq 'ObjectNotFound') {{ exit 0 }}; throw }}; \
         [pscustomobject]@{{ \
         Name = [string]$c.Name; \
         ServerAddress = [string]$c.ServerAddress; \
         TunnelType = [string]$c.TunnelType; \
         AllUserConnection = [bool]$c.AllUserConnection; \
         AuthenticationMethod = @($c.AuthenticationMethod | ForEach-Object {{ [string]$_ }}); \
         SplitTunneling = [bool]$c.SplitTunneling \
         }} | ConvertTo-Json -Compress",
        name = escape(name),
        scope = scope_switch(scope),
    )
}

/// Create (or overwrite, via `-Force`) a connection. The preshared key is read
/// from [`PSK_ENV_VAR`].
pub fn create_script(profile: &VpnProfileConfig) -> String {
    format!(
        "Add-VpnConnection -Name '{name}' -ServerAddress '{server}' -TunnelType '{tunnel}' \
         -AuthenticationMethod '{auth}' -L2tpPsk $env:{PSK_ENV_VAR} \
         -SplitTunneling:{split}{scope} -Force",
        name = escape(&profile.name),
        server = escape(&profile.server_address),
        tunnel = profile.tunnel_type,
        auth = profile.authentication_method,
        split = ps_bool(profile.split_tunnel),
        scope = scope_switch(profile.scope()),
    )
}

pub fn delete_script(name: &str, scope: ConnectionScope) -> String {
    format!(
        "Remove-VpnConnection -Name '{name}'{scope} -Force",
        name = escape(name),
        scope = scope_switch(scope),
    )
}

/// Parse the output of [`find_script`]. Empty output means not found.
pub fn parse_connection(stdout: &str) -> Result<Option<VpnProfileState>, StoreError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

// -- Stub store for non-Windows --

pub struct StubStore;

impl ProfileStore for StubStore {
    async fn find(
        &self,
        _name: &str,
        _scope: ConnectionScope,
    ) -> Result<Option<VpnProfileState>, StoreError> {
        Err(StoreError::Unsupported)
    }

    async fn create(&self, _profile: &VpnProfileConfig) -> Result<(), StoreError> {
        Err(StoreError::Unsupported)
    }

    async fn delete(&self, _name: &str, _scope: ConnectionScope) -> Result<(), StoreError> {
        Err(StoreError::Unsupported)
    }
}

// -- Windows implementation --

#[cfg(windows)]
pub mod windows {
    use std::process::Stdio;

    use tokio::process::Command;
    use tracing::{debug, info, warn};
    use vpnwarden_types::{ConnectionScope, VpnProfileConfig, VpnProfileState};

    use super::{
        PSK_ENV_VAR, ProfileStore, StoreError, create_script, delete_script, find_script,
        parse_connection,
    };

    /// Drives the `VpnClient` cmdlets through a PowerShell child process.
    pub struct PowerShellStore {
        powershell: String,
    }

    impl PowerShellStore {
        pub fn new(powershell: impl Into<String>) -> Self {
            Self {
                powershell: powershell.into(),
            }
        }

        async fn run(&self, script: &str, psk: Option<&str>) -> Result<String, StoreError> {
            let full_script = format!("$ErrorActionPreference = 'Stop'; {script}");
            debug!(chars = full_script.len(), "running PowerShell script");

            let mut cmd = Command::new(&self.powershell);
            cmd.args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                &full_script,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
            if let Some(psk) = psk {
                cmd.env(PSK_ENV_VAR, psk);
            }

            let output = cmd.output().await?;
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

            if !output.status.success() {
                let code = output.status.code().unwrap_or(-1);
                warn!(code, stderr = %stderr, "PowerShell command failed");
                return Err(StoreError::Command { code, stderr });
            }
            Ok(stdout)
        }
    }

    impl ProfileStore for PowerShellStore {
        async fn find(
            &self,
            name: &str,
            scope: ConnectionScope,
        ) -> Result<Option<VpnProfileState>, StoreError> {
            let stdout = self.run(&find_script(name, scope), None).await?;
            let state = parse_connection(&stdout)?;
            debug!(profile = name, found = state.is_some(), "queried VPN connection");
            Ok(state)
        }

        async fn create(&self, profile: &VpnProfileConfig) -> Result<(), StoreError> {
            self.run(&create_script(profile), Some(profile.preshared_key.expose()))
                .await?;
            info!(
                profile = %profile.name,
                server = %profile.server_address,
                tunnel_type = %profile.tunnel_type,
                "added VPN connection"
            );
            Ok(())
        }

        async fn delete(&self, name: &str, scope: ConnectionScope) -> Result<(), StoreError> {
            self.run(&delete_script(name, scope), None).await?;
            info!(profile = name, "removed VPN connection");
            Ok(())
        }
    }
}
