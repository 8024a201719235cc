use std::sync::Mutex;

use test_case::test_case;
use vpnwarden_agent::config::{self, ConfigError, ProfileParams};
use vpnwarden_agent::reconcile::{self, ReconcileOptions};
use vpnwarden_agent::report::{FAILURE_MARKER, Outcome, Report, SUCCESS_MARKER};
use vpnwarden_agent::store::{ProfileStore, StoreError};
use vpnwarden_types::{
    AuthenticationMethod, ConnectionScope, PresharedKey, TunnelType, VpnProfileConfig,
    VpnProfileState,
};

// -- Fake store that records calls --

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Find(String, ConnectionScope),
    Create(String),
    Delete(String, ConnectionScope),
}

#[derive(Default)]
struct FakeStore {
    profile: Mutex<Option<VpnProfileState>>,
    calls: Mutex<Vec<Call>>,
    find_error: Option<&'static str>,
    create_error: Option<&'static str>,
    delete_error: Option<&'static str>,
    /// Create returns Ok without storing anything.
    create_is_silent_noop: bool,
}

impl FakeStore {
    fn empty() -> Self {
        Self::default()
    }

    fn with_profile(state: VpnProfileState) -> Self {
        Self {
            profile: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn stored(&self) -> Option<VpnProfileState> {
        self.profile.lock().unwrap().clone()
    }

    fn failure(detail: &str) -> StoreError {
        StoreError::Command {
            code: 1,
            stderr: detail.to_string(),
        }
    }
}

impl ProfileStore for FakeStore {
    async fn find(
        &self,
        name: &str,
        scope: ConnectionScope,
    ) -> Result<Option<VpnProfileState>, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Find(name.to_string(), scope));
        if let Some(detail) = self.find_error {
            return Err(Self::failure(detail));
        }
        Ok(self
            .profile
            .lock()
            .unwrap()
            .clone()
            .filter(|p| p.name == name))
    }

    async fn create(&self, profile: &VpnProfileConfig) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Create(profile.name.clone()));
        if let Some(detail) = self.create_error {
            return Err(Self::failure(detail));
        }
        if !self.create_is_silent_noop {
            *self.profile.lock().unwrap() = Some(state_of(profile));
        }
        Ok(())
    }

    async fn delete(&self, name: &str, scope: ConnectionScope) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(name.to_string(), scope));
        if let Some(detail) = self.delete_error {
            return Err(Self::failure(detail));
        }
        self.profile.lock().unwrap().take();
        Ok(())
    }
}

// -- Helpers --

fn state_of(profile: &VpnProfileConfig) -> VpnProfileState {
    VpnProfileState {
        name: profile.name.clone(),
        server_address: profile.server_address.clone(),
        tunnel_type: profile.tunnel_type,
        all_user_connection: profile.all_user_connection,
        authentication_method: vec![profile.authentication_method],
        split_tunnel: profile.split_tunnel,
    }
}

fn desired() -> VpnProfileConfig {
    VpnProfileConfig {
        name: "Acme VPN".into(),
        server_address: "vpn.acme.example".into(),
        tunnel_type: TunnelType::L2tp,
        all_user_connection: true,
        preshared_key: PresharedKey::new("correct horse"),
        authentication_method: AuthenticationMethod::MSChapv2,
        split_tunnel: false,
    }
}

fn find() -> Call {
    Call::Find("Acme VPN".into(), ConnectionScope::AllUsers)
}

fn create() -> Call {
    Call::Create("Acme VPN".into())
}

fn delete() -> Call {
    Call::Delete("Acme VPN".into(), ConnectionScope::AllUsers)
}

fn terminal_line(report: &Report) -> String {
    report.render().lines().last().unwrap().to_string()
}

async fn run(store: &FakeStore, desired: &VpnProfileConfig) -> Report {
    reconcile::reconcile(store, desired, ReconcileOptions::default()).await
}

// -- Tests --

#[tokio::test]
async fn absent_profile_is_created_and_verified() {
    let store = FakeStore::empty();

    let report = run(&store, &desired()).await;

    assert!(report.is_success());
    assert!(terminal_line(&report).starts_with(SUCCESS_MARKER));
    assert_eq!(store.calls(), vec![find(), create(), find()]);
    assert_eq!(store.stored(), Some(state_of(&desired())));
}

#[tokio::test]
async fn created_profile_found_by_later_lookup() {
    let store = FakeStore::empty();
    run(&store, &desired()).await;

    let found = store
        .find("Acme VPN", ConnectionScope::AllUsers)
        .await
        .unwrap();
    assert!(found.is_some());
}

#[tokio::test]
async fn matching_profile_is_left_alone() {
    let store = FakeStore::with_profile(state_of(&desired()));

    let report = run(&store, &desired()).await;

    assert_eq!(
        report.outcome(),
        &Outcome::Success("VPN profile 'Acme VPN' verified, no changes needed".into())
    );
    assert!(terminal_line(&report).contains("verified"));
    assert_eq!(store.calls(), vec![find()]);
}

#[test_case(|s: &mut VpnProfileState| s.server_address = "old.acme.example".into(); "server address")]
#[test_case(|s: &mut VpnProfileState| s.authentication_method = vec![AuthenticationMethod::Pap]; "authentication method")]
#[test_case(|s: &mut VpnProfileState| s.tunnel_type = TunnelType::Sstp; "tunnel type")]
#[test_case(|s: &mut VpnProfileState| s.split_tunnel = true; "split tunnel")]
#[tokio::test]
async fn drifted_profile_is_recreated(mutate: fn(&mut VpnProfileState)) {
    let mut existing = state_of(&desired());
    mutate(&mut existing);
    let store = FakeStore::with_profile(existing);

    let report = run(&store, &desired()).await;

    assert!(report.is_success(), "{}", report.render());
    assert_eq!(
        terminal_line(&report),
        "!SUCCESS: VPN profile 'Acme VPN' recreated with updated settings"
    );
    assert_eq!(store.calls(), vec![find(), delete(), create(), find()]);
    assert_eq!(store.stored(), Some(state_of(&desired())));
}

#[tokio::test]
async fn preshared_key_never_causes_recreate() {
    let store = FakeStore::with_profile(state_of(&desired()));
    let mut rotated = desired();
    rotated.preshared_key = PresharedKey::new("different");

    run(&store, &rotated).await;

    assert_eq!(store.calls(), vec![find()]);
}

#[tokio::test]
async fn create_error_fails_without_further_calls() {
    let store = FakeStore {
        create_error: Some("Access is denied."),
        ..FakeStore::default()
    };

    let report = run(&store, &desired()).await;

    assert!(!report.is_success());
    let last = terminal_line(&report);
    assert!(last.starts_with(FAILURE_MARKER));
    assert!(last.contains("Access is denied."));
    assert_eq!(store.calls(), vec![find(), create()]);
}

#[tokio::test]
async fn silent_create_failure_detected_by_verification() {
    let store = FakeStore {
        create_is_silent_noop: true,
        ..FakeStore::default()
    };

    let report = run(&store, &desired()).await;

    assert_eq!(
        terminal_line(&report),
        "!FAILED: failed to create VPN profile 'Acme VPN': profile not found after creation"
    );
}

#[tokio::test]
async fn delete_error_skips_create() {
    let mut existing = state_of(&desired());
    existing.server_address = "old.acme.example".into();
    let store = FakeStore {
        delete_error: Some("The connection is in use."),
        ..FakeStore::with_profile(existing.clone())
    };

    let report = run(&store, &desired()).await;

    let last = terminal_line(&report);
    assert!(last.starts_with(FAILURE_MARKER));
    assert!(last.contains("The connection is in use."));
    assert_eq!(store.calls(), vec![find(), delete()]);
    assert_eq!(store.stored(), Some(existing));
}

#[tokio::test]
async fn recreate_error_leaves_profile_deleted() {
    let mut existing = state_of(&desired());
    existing.tunnel_type = TunnelType::Pptp;
    let store = FakeStore {
        create_error: Some("The parameter is incorrect."),
        ..FakeStore::with_profile(existing)
    };

    let report = run(&store, &desired()).await;

    let last = terminal_line(&report);
    assert!(last.starts_with("!FAILED: failed to recreate VPN profile 'Acme VPN'"));
    assert!(last.contains("The parameter is incorrect."));
    assert_eq!(store.calls(), vec![find(), delete(), create()]);
    assert_eq!(store.stored(), None);
}

#[tokio::test]
async fn lookup_error_treated_as_absent_by_default() {
    let store = FakeStore {
        find_error: Some("WMI query failed"),
        ..FakeStore::default()
    };

    let report = run(&store, &desired()).await;

    // The verification lookup fails the same way.
    assert!(!report.is_success());
    assert_eq!(store.calls(), vec![find(), create(), find()]);
}

#[tokio::test]
async fn strict_lookup_aborts_before_mutation() {
    let store = FakeStore {
        find_error: Some("WMI query failed"),
        ..FakeStore::with_profile(state_of(&desired()))
    };
    let options = ReconcileOptions {
        strict_lookup: true,
    };

    let report = reconcile::reconcile(&store, &desired(), options).await;

    let last = terminal_line(&report);
    assert!(last.starts_with(FAILURE_MARKER));
    assert!(last.contains("WMI query failed"));
    assert_eq!(store.calls(), vec![find()]);
}

#[tokio::test]
async fn current_user_profile_uses_current_user_scope() {
    let mut profile = desired();
    profile.all_user_connection = false;
    let store = FakeStore::empty();

    let report = run(&store, &profile).await;

    assert!(report.is_success());
    assert_eq!(
        store.calls(),
        vec![
            Call::Find("Acme VPN".into(), ConnectionScope::CurrentUser),
            create(),
            Call::Find("Acme VPN".into(), ConnectionScope::CurrentUser),
        ]
    );
}

#[tokio::test]
async fn split_tunnel_with_default_client_name() {
    let params = ProfileParams {
        server_address: Some("vpn.acme.example".into()),
        tunnel_type: Some("L2tp".into()),
        preshared_key: Some(PresharedKey::new("psk")),
        authentication_method: Some("MSChapv2".into()),
        split_tunnel: Some("1".into()),
        ..ProfileParams::default()
    };
    let desired = config::normalize(params).unwrap();
    let store = FakeStore::empty();

    let report = run(&store, &desired).await;

    assert!(terminal_line(&report).starts_with(SUCCESS_MARKER));
    let stored = store.stored().unwrap();
    assert_eq!(stored.name, "Automated VPN");
    assert!(stored.split_tunnel);
}

#[tokio::test]
async fn unsupported_tunnel_rejected_before_store() {
    let params = ProfileParams {
        server_address: Some("vpn.acme.example".into()),
        tunnel_type: Some("Wireguard".into()),
        preshared_key: Some(PresharedKey::new("psk")),
        authentication_method: Some("MSChapv2".into()),
        ..ProfileParams::default()
    };

    let err = config::resolve(None, params).await.unwrap_err();
    assert!(matches!(err, ConfigError::InvalidArgument(_)));

    let report = Report::failed(err.to_string());
    assert!(terminal_line(&report).starts_with("!FAILED: invalid argument: unknown tunnel type 'Wireguard'"));
}

#[tokio::test]
async fn report_has_progress_then_one_marker() {
    let mut existing = state_of(&desired());
    existing.split_tunnel = true;
    let store = FakeStore::with_profile(existing);

    let rendered = run(&store, &desired()).await.render();
    let lines: Vec<&str> = rendered.lines().collect();

    assert_eq!(lines[0], "Checking VPN profile 'Acme VPN'");
    assert!(lines.len() > 2);
    let markers = lines
        .iter()
        .filter(|l| l.starts_with(SUCCESS_MARKER) || l.starts_with(FAILURE_MARKER))
        .count();
    assert_eq!(markers, 1);
    assert!(!rendered.contains("correct horse"));
}
