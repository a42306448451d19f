//! Renaming and moving entries.
//!
//! Planning is pure: it turns a modify-DN request into the new DN and
//! decides whether the old RDN values stay on the entry. Applying the plan
//! goes through [`Repository::update_dn`], replayed unchanged while the store
//! reports transient conflicts.

use dirpg_schema::{Dn, Rdn, Schema};
use dirpg_store::{Repository, StoreResult};
use dirpg_types::LdapResult;
use tracing::{debug, error, warn};

/// Outcome of planning a rename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenamePlan {
    pub new_dn: Dn,
    /// The old RDN when its values must be kept as ordinary attributes.
    pub old_rdn: Option<Rdn>,
}

/// Replace the leaf RDN of `dn` with `new_rdn`.
pub fn plan_rename(
    schema: &Schema,
    dn: &Dn,
    new_rdn: &str,
    delete_old_rdn: bool,
) -> LdapResult<RenamePlan> {
    let rdn = Rdn::parse(schema, new_rdn)?;
    let new_dn = dn.with_rdn(rdn)?;
    let old_rdn = if delete_old_rdn {
        None
    } else {
        dn.rdn().cloned()
    };
    Ok(RenamePlan { new_dn, old_rdn })
}

/// Re-parent `new_dn` under `new_superior`.
pub fn plan_move(schema: &Schema, new_dn: &Dn, new_superior: &str) -> LdapResult<Dn> {
    let superior = Dn::parse(schema, new_superior)?;
    new_dn.move_to(&superior)
}

/// Apply a rename, replaying it after transient conflicts.
///
/// At most `max_retry + 1` attempts are made, back to back. The last error is
/// returned when the retries run out or a non-transient error occurs.
pub async fn apply_rename<R: Repository + ?Sized>(
    repo: &R,
    old: &Dn,
    new: &Dn,
    old_rdn: Option<&Rdn>,
    max_retry: usize,
) -> StoreResult<()> {
    let mut attempt = 0;
    loop {
        match repo.update_dn(old, new, old_rdn).await {
            Ok(()) => {
                debug!(old = %old, new = %new, attempt, "rename applied");
                return Ok(());
            }
            Err(err) if err.is_transient() && attempt < max_retry => {
                attempt += 1;
                warn!(dn = %old, attempt, error = %err, "rename conflict, retrying");
            }
            Err(err) => {
                if err.is_transient() {
                    error!(dn = %old, attempt, error = %err, "rename gave up after retries");
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use dirpg_entry::{AddEntry, ModifyEntry};
    use dirpg_store::{SearchQuery, StoreError, StoredEntry};
    use dirpg_types::{LdapError, ResultCode};

    /// Fails `update_dn` with scripted errors, then succeeds.
    struct Scripted {
        failures: Mutex<VecDeque<StoreError>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(failures: Vec<StoreError>) -> Self {
            Self {
                failures: Mutex::new(failures.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn conflicts(n: usize) -> Self {
            Self::new(
                (0..n)
                    .map(|i| StoreError::Conflict {
                        reason: format!("attempt {i}"),
                    })
                    .collect(),
            )
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn unused() -> StoreError {
        StoreError::Backend("not scripted".into())
    }

    #[async_trait]
    impl Repository for Scripted {
        async fn insert(&self, _entry: &AddEntry) -> StoreResult<StoredEntry> {
            Err(unused())
        }

        async fn find(&self, _dn: &Dn) -> StoreResult<Option<StoredEntry>> {
            Err(unused())
        }

        async fn update(&self, _entry: &ModifyEntry) -> StoreResult<()> {
            Err(unused())
        }

        async fn update_dn(&self, _old: &Dn, _new: &Dn, _old_rdn: Option<&Rdn>) -> StoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.lock().expect("lock poisoned").pop_front() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        async fn delete(&self, _dn: &Dn) -> StoreResult<()> {
            Err(unused())
        }

        async fn search(&self, _query: &SearchQuery) -> StoreResult<Vec<StoredEntry>> {
            Err(unused())
        }
    }

    fn dn(schema: &Schema, text: &str) -> Dn {
        Dn::parse(schema, text).unwrap()
    }

    // ---- Test 1: planning ----

    #[test]
    fn rename_keeps_parent() {
        let schema = Schema::builtin();
        let old = dn(&schema, "uid=alice,ou=people,dc=example,dc=com");
        let plan = plan_rename(&schema, &old, "uid=alicia", true).unwrap();
        assert_eq!(plan.new_dn, dn(&schema, "uid=alicia,ou=people,dc=example,dc=com"));
        assert!(plan.old_rdn.is_none());

        let plan = plan_rename(&schema, &old, "uid=alicia", false).unwrap();
        assert_eq!(plan.old_rdn.as_ref(), old.rdn());
    }

    #[test]
    fn rename_errors() {
        let schema = Schema::builtin();
        let old = dn(&schema, "uid=alice,ou=people,dc=example,dc=com");
        let err = plan_rename(&schema, &old, "uid", true).unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidDnSyntax);

        let err = plan_rename(&schema, &Dn::root(), "uid=x", true).unwrap_err();
        assert_eq!(err.code(), ResultCode::UnwillingToPerform);
    }

    #[test]
    fn move_reparents() {
        let schema = Schema::builtin();
        let renamed = dn(&schema, "uid=alicia,ou=people,dc=example,dc=com");
        let moved = plan_move(&schema, &renamed, "ou=staff,dc=example,dc=com").unwrap();
        assert_eq!(moved, dn(&schema, "uid=alicia,ou=staff,dc=example,dc=com"));

        let err = plan_move(&schema, &renamed, "ou=staff,,dc=com").unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidDnSyntax);
    }

    // ---- Test 2: retry loop ----

    #[tokio::test]
    async fn retries_transient_conflicts() {
        let schema = Schema::builtin();
        let (old, new) = (dn(&schema, "uid=a,dc=example"), dn(&schema, "uid=b,dc=example"));
        let repo = Scripted::conflicts(3);
        apply_rename(&repo, &old, &new, None, 10).await.unwrap();
        assert_eq!(repo.calls(), 4);
    }

    #[tokio::test]
    async fn gives_up_after_max_retry() {
        let schema = Schema::builtin();
        let (old, new) = (dn(&schema, "uid=a,dc=example"), dn(&schema, "uid=b,dc=example"));
        let repo = Scripted::conflicts(5);
        let err = apply_rename(&repo, &old, &new, None, 2).await.unwrap_err();
        assert_eq!(repo.calls(), 3);
        assert_eq!(err, StoreError::Conflict { reason: "attempt 2".into() });
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let schema = Schema::builtin();
        let (old, new) = (dn(&schema, "uid=a,dc=example"), dn(&schema, "uid=b,dc=example"));
        let repo = Scripted::conflicts(1);
        assert!(apply_rename(&repo, &old, &new, None, 0).await.is_err());
        assert_eq!(repo.calls(), 1);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let schema = Schema::builtin();
        let (old, new) = (dn(&schema, "uid=a,dc=example"), dn(&schema, "uid=b,dc=example"));
        let repo = Scripted::new(vec![
            StoreError::Conflict { reason: "first".into() },
            StoreError::NoSuchObject { dn: "uid=a,dc=example".into() },
        ]);
        let err = apply_rename(&repo, &old, &new, None, 10).await.unwrap_err();
        assert_eq!(repo.calls(), 2);
        assert_eq!(LdapError::from(err).code(), ResultCode::NoSuchObject);
    }
}
