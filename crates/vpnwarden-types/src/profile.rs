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

//! Desired and observed VPN profile models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParamError;

/// VPN tunnel protocol of a connection profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum TunnelType {
    /// Let Windows negotiate the protocol.
    Automatic,
    /// IKEv2.
    Ikev2,
    /// L2TP/IPsec.
    L2tp,
    /// PPTP.
    Pptp,
    /// SSTP.
    Sstp,
}

impl TunnelType {
    /// Every accepted tunnel type, in documentation order.
    pub const ALL: [Self; 5] = [Self::Automatic, Self::Ikev2, Self::L2tp, Self::Pptp, Self::Sstp];

    /// The literal Windows uses for this tunnel type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Automatic => "Automatic",
            Self::Ikev2 => "Ikev2",
            Self::L2tp => "L2tp",
            Self::Pptp => "Pptp",
            Self::Sstp => "Sstp",
        }
    }
}

impl fmt::Display for TunnelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TunnelType {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParamError::UnknownTunnelType(s.to_string()))
    }
}

impl TryFrom<String> for TunnelType {
    type Error = ParamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Authentication method used when dialing the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum AuthenticationMethod {
    /// CHAP.
    Chap,
    /// EAP.
    Eap,
    /// Machine certificate.
    MachineCertificate,
    /// MS-CHAPv2.
    MSChapv2,
    /// PAP.
    Pap,
}

impl AuthenticationMethod {
    /// Every accepted authentication method, in documentation order.
    pub const ALL: [Self; 5] = [
        Self::Chap,
        Self::Eap,
        Self::MachineCertificate,
        Self::MSChapv2,
        Self::Pap,
    ];

    /// The literal Windows uses for this method.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chap => "Chap",
            Self::Eap => "Eap",
            Self::MachineCertificate => "MachineCertificate",
            Self::MSChapv2 => "MSChapv2",
            Self::Pap => "Pap",
        }
    }
}

impl fmt::Display for AuthenticationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthenticationMethod {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParamError::UnknownAuthenticationMethod(s.to_string()))
    }
}

impl TryFrom<String> for AuthenticationMethod {
    type Error = ParamError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Which connection store a profile lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionScope {
    /// The machine-wide phonebook, usable before logon.
    AllUsers,
    /// The invoking user's phonebook.
    CurrentUser,
}

/// L2TP/IKE preshared key. Write-only: Windows never reports it back.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PresharedKey(String);

impl PresharedKey {
    /// Wrap a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the secret for handing to the OS store.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PresharedKey([redacted])")
    }
}

/// A field compared when checking a stored profile for drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    /// `ServerAddress`.
    ServerAddress,
    /// `AuthenticationMethod`.
    AuthenticationMethod,
    /// `TunnelType`.
    TunnelType,
    /// `SplitTunneling`.
    SplitTunnel,
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServerAddress => "server address",
            Self::AuthenticationMethod => "authentication method",
            Self::TunnelType => "tunnel type",
            Self::SplitTunnel => "split tunnel",
        })
    }
}

/// The desired state of the managed profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnProfileConfig {
    /// Profile name, `"<sanitized client name> VPN"`.
    pub name: String,
    /// VPN endpoint.
    pub server_address: String,
    /// Tunnel protocol.
    pub tunnel_type: TunnelType,
    /// Whether the profile is available before logon.
    pub all_user_connection: bool,
    /// Preshared key. Never compared against the stored profile.
    pub preshared_key: PresharedKey,
    /// Authentication method.
    pub authentication_method: AuthenticationMethod,
    /// Route only VPN-side subnets through the tunnel.
    pub split_tunnel: bool,
}

impl VpnProfileConfig {
    /// The store scope this profile is created, found, and removed in.
    pub fn scope(&self) -> ConnectionScope {
        if self.all_user_connection {
            ConnectionScope::AllUsers
        } else {
            ConnectionScope::CurrentUser
        }
    }

    /// Fields of `state` that differ from this configuration. Comparison is
    /// exact: the server address is not case-folded or canonicalized.
    pub fn drift(&self, state: &VpnProfileState) -> Vec<ProfileField> {
        let mut fields = Vec::new();
        if state.server_address != self.server_address {
            fields.push(ProfileField::ServerAddress);
        }
        if state.authentication_method.as_slice() != [self.authentication_method] {
            fields.push(ProfileField::AuthenticationMethod);
        }
        if state.tunnel_type != self.tunnel_type {
            fields.push(ProfileField::TunnelType);
        }
        if state.split_tunnel != self.split_tunnel {
            fields.push(ProfileField::SplitTunnel);
        }
        fields
    }

    /// Whether every compared field of `state` equals this configuration.
    pub fn matches(&self, state: &VpnProfileState) -> bool {
        self.drift(state).is_empty()
    }
}

/// A profile as reported by the OS store. The preshared key is absent since
/// Windows does not return it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpnProfileState {
    /// Profile name.
    pub name: String,
    /// VPN endpoint.
    pub server_address: String,
    /// Tunnel protocol.
    pub tunnel_type: TunnelType,
    /// Whether the profile lives in the all-user phonebook.
    #[serde(default)]
    pub all_user_connection: bool,
    /// Authentication methods, as Windows reports a list.
    #[serde(default)]
    pub authentication_method: Vec<AuthenticationMethod>,
    /// Split tunneling flag.
    #[serde(rename = "SplitTunneling", default)]
    pub split_tunnel: bool,
}
