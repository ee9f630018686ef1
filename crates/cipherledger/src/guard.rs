//! Access Guard: the single administrator and the reentrancy latch.
//!
//! The latch has two parts. A task-local marker is set for the duration of
//! a guarded call; a nested call on the same task sees the marker and
//! fails with [`LedgerError::Reentrancy`]. Calls from other tasks queue on
//! an async mutex instead, so guarded calls run one at a time.

use std::future::Future;

use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use cipherledger_core::Identity;

use crate::error::{LedgerError, Result};

tokio::task_local! {
    static IN_TRANSITION: ();
}

/// Admin state plus the mutation latch.
pub struct AccessGuard {
    admin: RwLock<Identity>,
    latch: Mutex<()>,
}

impl AccessGuard {
    /// Guard with `admin` as the initial administrator.
    pub fn new(admin: Identity) -> Result<Self> {
        if admin.is_zero() {
            return Err(LedgerError::InvalidTarget);
        }
        Ok(Self {
            admin: RwLock::new(admin),
            latch: Mutex::new(()),
        })
    }

    /// The current administrator.
    pub async fn admin(&self) -> Identity {
        *self.admin.read().await
    }

    /// Fail with `NotAdmin` unless `caller` is the administrator.
    pub async fn require_admin(&self, caller: &Identity) -> Result<()> {
        let admin = self.admin.read().await;
        if *caller != *admin {
            warn!(caller = %caller, "privileged call from non-admin");
            return Err(LedgerError::NotAdmin(*caller));
        }
        Ok(())
    }

    /// Replace the administrator.
    ///
    /// `persist` runs after both checks pass and before the in-memory swap;
    /// if it fails the administrator is unchanged. The admin lock is held
    /// throughout, so concurrent transfers apply one at a time.
    pub async fn transfer<F, Fut>(
        &self,
        caller: &Identity,
        new_admin: Identity,
        persist: F,
    ) -> Result<Identity>
    where
        F: FnOnce(Identity) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut admin = self.admin.write().await;

        if *caller != *admin {
            warn!(caller = %caller, "admin transfer from non-admin");
            return Err(LedgerError::NotAdmin(*caller));
        }
        if new_admin.is_zero() {
            warn!(caller = %caller, "admin transfer to null identity");
            return Err(LedgerError::InvalidTarget);
        }

        persist(new_admin).await?;

        let previous = std::mem::replace(&mut *admin, new_admin);
        Ok(previous)
    }

    /// Run `transition` under the latch.
    ///
    /// The latch is released when `transition` completes, whatever its
    /// outcome.
    pub async fn guarded<F, T>(&self, transition: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if Self::in_transition() {
            warn!("reentrant call rejected");
            return Err(LedgerError::Reentrancy);
        }

        let _held = self.latch.lock().await;
        IN_TRANSITION.scope((), transition).await
    }

    /// Whether the current task is inside a guarded call.
    pub fn in_transition() -> bool {
        IN_TRANSITION.try_with(|_| ()).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherledger_store::StoreError;

    fn id(b: u8) -> Identity {
        Identity::from_bytes([b; 32])
    }

    #[test]
    fn test_zero_initial_admin_rejected() {
        assert!(matches!(
            AccessGuard::new(Identity::ZERO),
            Err(LedgerError::InvalidTarget)
        ));
    }

    #[tokio::test]
    async fn test_require_admin() {
        let guard = AccessGuard::new(id(1)).unwrap();
        guard.require_admin(&id(1)).await.unwrap();
        assert!(matches!(
            guard.require_admin(&id(2)).await,
            Err(LedgerError::NotAdmin(who)) if who == id(2)
        ));
    }

    #[tokio::test]
    async fn test_transfer_checks_and_persists() {
        let guard = AccessGuard::new(id(1)).unwrap();

        let err = guard
            .transfer(&id(2), id(3), |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotAdmin(_)));

        let err = guard
            .transfer(&id(1), Identity::ZERO, |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTarget));
        assert_eq!(guard.admin().await, id(1));

        let err = guard
            .transfer(&id(1), id(3), |_| async {
                Err(LedgerError::Store(StoreError::InvalidData("disk full".into())))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Store(_)));
        assert_eq!(guard.admin().await, id(1));

        let previous = guard.transfer(&id(1), id(3), |_| async { Ok(()) }).await.unwrap();
        assert_eq!(previous, id(1));
        assert_eq!(guard.admin().await, id(3));
    }

    #[tokio::test]
    async fn test_nested_guarded_call_rejected() {
        let guard = AccessGuard::new(id(1)).unwrap();

        let inner = guard
            .guarded(async {
                assert!(AccessGuard::in_transition());
                Ok(guard.guarded(async { Ok::<(), LedgerError>(()) }).await)
            })
            .await
            .unwrap();

        assert!(matches!(inner, Err(LedgerError::Reentrancy)));
        assert!(!AccessGuard::in_transition());
    }

    #[tokio::test]
    async fn test_latch_released_on_failure() {
        let guard = AccessGuard::new(id(1)).unwrap();

        let failed: Result<()> = guard.guarded(async { Err(LedgerError::InvalidTarget) }).await;
        assert!(failed.is_err());

        guard.guarded(async { Ok::<(), LedgerError>(()) }).await.unwrap();
    }

    #[tokio::test]
    async fn test_other_tasks_wait_instead_of_failing() {
        use std::sync::Arc;

        let guard = Arc::new(AccessGuard::new(id(1)).unwrap());
        let mut tasks = Vec::new();

        for _ in 0..8 {
            let guard = guard.clone();
            tasks.push(tokio::spawn(async move {
                guard
                    .guarded(async {
                        tokio::task::yield_now().await;
                        Ok::<(), LedgerError>(())
                    })
                    .await
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }
    }
}
