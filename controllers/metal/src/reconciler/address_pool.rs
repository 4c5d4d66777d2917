//! AddressPool reconciler
//!
//! Validates the pool range and publishes it in status so Cluster passes can
//! gate on readiness. The allocation map is never touched here.

use super::Reconciler;
use crate::allocator::{self, AddressRange};
use crate::error::ControllerError;
use crate::reconciler::object_key;
use crds::{AddressPool, PoolState};
use tracing::{debug, info, warn};

impl Reconciler {
    /// Validate the pool range and publish readiness
    pub async fn reconcile_address_pool(&self, pool: &AddressPool) -> Result<(), ControllerError> {
        let key = object_key(pool, "AddressPool")?;
        info!("Reconciling AddressPool {}", key);

        let mut pool = match self.store.get_address_pool(&key).await {
            Ok(p) => p,
            Err(e) if e.is_not_found() => {
                debug!("AddressPool {} no longer exists, nothing to do", key);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let original = pool.status.clone().unwrap_or_default();
        let mut status = original.clone();
        match AddressRange::from_spec(&pool.spec) {
            Ok(range) => {
                status.status = PoolState::Ready;
                status.start_address = range.first().to_string();
                status.last_address = range.last().to_string();
                status.netmask = range.netmask().to_string();
                status.error = None;
                allocator::refresh_available(&mut status, &range);
            }
            Err(e) => {
                // claims are kept so they survive a spec fix
                warn!("AddressPool {} is invalid: {}", key, e);
                status.status = PoolState::Invalid;
                status.error = Some(e.to_string());
            }
        }

        if status == original {
            debug!("AddressPool {} status unchanged", key);
            return Ok(());
        }
        pool.status = Some(status);
        self.store.update_address_pool_status(&pool).await?;
        info!("AddressPool {} status updated", key);
        Ok(())
    }
}
