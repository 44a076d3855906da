use std::collections::BTreeSet;

use hubbench_core::TrialConfig;
use hubbench_hub::{HubStore, StoreError};
use rand::Rng;
use tracing::debug;

/// Shared dummy endpoint every active session points at. Nothing
/// listens there in null-collaborator trials.
pub const SESSION_TARGET_IP: &str = "127.0.0.1";
pub const SESSION_TARGET_PORT: u16 = 12345;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSummary {
    pub tenants: u64,
    pub active: u64,
    pub admin_token: String,
}

/// Fills a fresh backing store with `population` tenants and attaches
/// sessions to the active selection, committed in one transaction.
///
/// The selection is `active` draws *with replacement* over the
/// population index space, deduplicated; duplicate draws mean the
/// committed session count can undershoot the request, so callers must
/// not rely on an exact count.
pub fn seed_population<R: Rng>(
    store: &HubStore,
    config: &TrialConfig,
    rng: &mut R,
) -> Result<SeedSummary, StoreError> {
    let mut selection: BTreeSet<usize> = BTreeSet::new();
    if config.population > 0 {
        for _ in 0..config.active {
            selection.insert(rng.gen_range(0..config.population));
        }
    }
    let admin_token = hex::encode(rng.gen::<[u8; 16]>());

    store.in_transaction(|s| {
        s.insert_credential(&admin_token, "admin")?;
        for i in 0..config.population {
            let id = s.insert_tenant(&format!("tenant-{i}"))?;
            if selection.contains(&i) {
                s.attach_session(id, SESSION_TARGET_IP, SESSION_TARGET_PORT)?;
            }
        }
        Ok(())
    })?;

    debug!(
        tenants = config.population,
        requested = config.active,
        active = selection.len(),
        "population seeded"
    );
    Ok(SeedSummary {
        tenants: config.population as u64,
        active: selection.len() as u64,
        admin_token,
    })
}
