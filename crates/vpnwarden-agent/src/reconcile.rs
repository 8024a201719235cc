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

use tracing::{debug, error, info, warn};
use vpnwarden_types::{ProfileField, VpnProfileConfig, VpnProfileState};

use crate::report::{Outcome, Progress, Report};
use crate::store::{ProfileStore, StoreError};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Abort when the lookup query itself fails instead of treating the
    /// profile as absent.
    pub strict_lookup: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to query VPN profile '{name}': {source}")]
    LookupFailed {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to create VPN profile '{name}': {detail}")]
    CreateFailed { name: String, detail: String },

    #[error("failed to recreate VPN profile '{name}': {detail}")]
    DeleteOrRecreateFailed { name: String, detail: String },
}

/// Bring the stored profile in line with `desired` and report the result.
///
/// 1. Look the profile up by name
/// 2. Absent: create it, then confirm it exists
/// 3. Present and matching: nothing to do
/// 4. Present with drift: delete, create, then confirm it exists
///
/// Store errors never escape; they become a failed [`Report`]. Nothing is
/// retried.
#[tracing::instrument(skip_all, fields(profile = %desired.name))]
pub async fn reconcile<S: ProfileStore>(
    store: &S,
    desired: &VpnProfileConfig,
    options: ReconcileOptions,
) -> Report {
    let mut progress = Progress::default();
    progress.push(format!("Checking VPN profile '{}'", desired.name));

    match reconcile_profile(store, desired, options, &mut progress).await {
        Ok(detail) => {
            info!(detail = %detail, "reconciliation complete");
            progress.finish(Outcome::Success(detail))
        }
        Err(e) => {
            error!(error = %e, "reconciliation failed");
            progress.finish(Outcome::Failed(e.to_string()))
        }
    }
}

async fn reconcile_profile<S: ProfileStore>(
    store: &S,
    desired: &VpnProfileConfig,
    options: ReconcileOptions,
    progress: &mut Progress,
) -> Result<String, ReconcileError> {
    let name = &desired.name;

    let Some(existing) = lookup(store, desired, options).await? else {
        progress.push(format!("VPN profile '{name}' not found, creating it"));
        info!("profile absent, creating");

        store
            .create(desired)
            .await
            .map_err(|e| ReconcileError::CreateFailed {
                name: name.clone(),
                detail: e.to_string(),
            })?;

        confirm_exists(store, desired)
            .await
            .map_err(|detail| ReconcileError::CreateFailed {
                name: name.clone(),
                detail,
            })?;

        return Ok(format!("VPN profile '{name}' created"));
    };

    let drift = desired.drift(&existing);
    if drift.is_empty() {
        debug!("profile matches desired configuration");
        return Ok(format!("VPN profile '{name}' verified, no changes needed"));
    }

    let fields = describe(&drift);
    warn!(fields = %fields, "profile has drifted, recreating");
    progress.push(format!("VPN profile '{name}' differs in {fields}, recreating it"));

    let repair_failed = |detail: String| ReconcileError::DeleteOrRecreateFailed {
        name: name.clone(),
        detail,
    };

    store
        .delete(name, desired.scope())
        .await
        .map_err(|e| repair_failed(format!("remove failed: {e}")))?;
    progress.push(format!("Removed VPN profile '{name}'"));

    store
        .create(desired)
        .await
        .map_err(|e| repair_failed(format!("add failed: {e}")))?;

    confirm_exists(store, desired).await.map_err(repair_failed)?;

    Ok(format!("VPN profile '{name}' recreated with updated settings"))
}

/// Query the current profile. A query error is treated as "absent" unless
/// strict lookup is on, in which case it aborts the run before any change.
async fn lookup<S: ProfileStore>(
    store: &S,
    desired: &VpnProfileConfig,
    options: ReconcileOptions,
) -> Result<Option<VpnProfileState>, ReconcileError> {
    match store.find(&desired.name, desired.scope()).await {
        Ok(state) => Ok(state),
        Err(e) if options.strict_lookup => Err(ReconcileError::LookupFailed {
            name: desired.name.clone(),
            source: e,
        }),
        Err(e) => {
            warn!(error = %e, "profile lookup failed, treating as absent");
            Ok(None)
        }
    }
}

async fn confirm_exists<S: ProfileStore>(
    store: &S,
    desired: &VpnProfileConfig,
) -> Result<(), String> {
    match store.find(&desired.name, desired.scope()).await {
        Ok(Some(_)) => {
            debug!("profile present after write");
            Ok(())
        }
        Ok(None) => Err("profile not found after creation".to_string()),
        Err(e) => Err(format!("profile could not be verified after creation: {e}")),
    }
}

fn describe(fields: &[ProfileField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
