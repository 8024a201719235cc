//! vpnwarden-types: Shared type definitions for the vpnwarden reconciler.
//!
//! This crate contains the desired and observed VPN profile models, the
//! enumerations accepted for tunnel and authentication settings, and the
//! rules that turn a client name into a profile name.

#![warn(missing_docs)]

pub mod profile;

use thiserror::Error;

pub use profile::{
    AuthenticationMethod, ConnectionScope, PresharedKey, ProfileField, TunnelType,
    VpnProfileConfig, VpnProfileState,
};

/// Client name used when the caller does not supply one.
pub const DEFAULT_CLIENT_NAME: &str = "Automated";

/// Suffix appended to the sanitized client name to form the profile name.
pub const PROFILE_NAME_SUFFIX: &str = " VPN";

/// A caller-supplied value that is outside its accepted set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    /// Tunnel type literal not in Automatic/Ikev2/L2tp/Pptp/Sstp.
    #[error("unknown tunnel type '{0}' (expected one of Automatic, Ikev2, L2tp, Pptp, Sstp)")]
    UnknownTunnelType(String),

    /// Authentication method literal not in the supported set.
    #[error(
        "unknown authentication method '{0}' (expected one of Chap, Eap, MachineCertificate, MSChapv2, Pap)"
    )]
    UnknownAuthenticationMethod(String),

    /// Split tunnel flag other than 0 or 1.
    #[error("split tunnel flag must be 0 or 1, got '{0}'")]
    SplitTunnelFlag(String),
}

/// Strip every character that is not alphanumeric, an underscore, or
/// whitespace. Order of the remaining characters is preserved.
pub fn sanitize_client_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

/// Derive the managed profile name, e.g. `"Acme-Corp!"` becomes `"AcmeCorp VPN"`.
pub fn profile_name(client_name: &str) -> String {
    format!("{}{PROFILE_NAME_SUFFIX}", sanitize_client_name(client_name))
}

/// Interpret the split tunnel flag literal. Only `0` and `1` are accepted.
pub fn split_tunnel_from_flag(flag: &str) -> Result<bool, ParamError> {
    match flag.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(ParamError::SplitTunnelFlag(other.to_string())),
    }
}
