//! Keypair consistency between the provider and local storage.

use tracing::{info, warn};

use crate::identity::Identity;
use crate::keystore::KeyStore;
use crate::models::compute::KeypairPresence;
use crate::provider::ComputeApi;
use crate::{AppError, Result};

/// Check both existence facts for the identity's keypair.
///
/// # Errors
///
/// Returns `AppError::Provider` if the provider lookup fails.
pub async fn keypair_presence(
    compute: &dyn ComputeApi,
    keys: &dyn KeyStore,
    identity: &Identity,
) -> Result<KeypairPresence> {
    let name = identity.keypair_name();
    let remote = compute.keypair_exists(&name).await?;
    let local = keys.exists(&name);
    Ok(KeypairPresence { remote, local })
}

/// Make sure the identity's keypair exists on both sides.
///
/// Never repairs a half-present keypair.
///
/// # Errors
///
/// Returns `AppError::KeypairInconsistent` if the sides disagree and
/// `AppError::Provisioning` if a check, the creation, or the local write fails.
pub async fn ensure_keypair(
    compute: &dyn ComputeApi,
    keys: &dyn KeyStore,
    identity: &Identity,
) -> Result<()> {
    let name = identity.keypair_name();
    let presence = keypair_presence(compute, keys, identity)
        .await
        .map_err(|err| AppError::Provisioning(format!("keypair lookup failed: {err}")))?;

    if !presence.is_consistent() {
        warn!(
            keypair = name,
            remote = presence.remote,
            local = presence.local,
            "keypair exists on one side only"
        );
        return Err(AppError::KeypairInconsistent {
            name,
            remote: presence.remote,
            local: presence.local,
        });
    }

    if presence.remote {
        info!(keypair = name, "keypair already present");
        return Ok(());
    }

    let material = compute
        .create_keypair(&name)
        .await
        .map_err(|err| AppError::Provisioning(format!("failed to create keypair {name}: {err}")))?;
    keys.write(&name, &material).map_err(|err| {
        AppError::Provisioning(format!("failed to store private key for {name}: {err}"))
    })?;

    info!(keypair = name, path = %keys.path(&name).display(), "created keypair");
    Ok(())
}

/// Delete whichever sides of the identity's keypair exist.
///
/// Returns what was present before the purge.
///
/// # Errors
///
/// Returns `AppError::Provider` or `AppError::Io` if a deletion fails.
pub async fn purge_keypair(
    compute: &dyn ComputeApi,
    keys: &dyn KeyStore,
    identity: &Identity,
) -> Result<KeypairPresence> {
    let name = identity.keypair_name();
    let presence = keypair_presence(compute, keys, identity).await?;

    if presence.remote {
        compute.delete_keypair(&name).await?;
        info!(keypair = name, "deleted remote keypair");
    }
    if presence.local {
        keys.delete(&name)?;
    }
    Ok(presence)
}
