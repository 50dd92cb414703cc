//! Create-first synchronization shared by every owned kind.

use std::fmt;

use kube::{Resource, ResourceExt};
use tracing::{info, warn};

use crate::api::v1alpha1::ManagementIngress;
use crate::diff::{Diff, Diffable};
use crate::util::{
    errors::StdError,
    store::{object_key, CreateOutcome, Object, ObjectStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
    /// Create-only object that was already present.
    Existing,
}

impl SyncOutcome {
    pub fn mutated(&self) -> bool {
        matches!(self, SyncOutcome::Created | SyncOutcome::Updated)
    }
}

/// What one synchronizer did to one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synced {
    pub kind: String,
    pub name: String,
    pub outcome: SyncOutcome,
}

impl fmt::Display for Synced {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} '{}' {:?}", self.kind, self.name, self.outcome)
    }
}

/// Marks `owner` as the controller of `obj` so deletion cascades.
///
/// Failing to build the reference is not fatal: the next pass adopts the object.
pub fn set_owner<K: Object>(owner: &ManagementIngress, obj: &mut K) {
    match owner.controller_owner_ref(&()) {
        Some(oref) => obj.meta_mut().owner_references = Some(vec![oref]),
        None => warn!(
            "Unable to set owner reference on {} '{}': owner has no uid",
            K::kind(&()),
            obj.name_any()
        ),
    }
}

fn adopt<K: Object>(live: &mut K, desired: &K) -> bool {
    let orphaned = live.owner_references().is_empty();
    match desired.meta().owner_references.as_ref() {
        Some(refs) if orphaned && !refs.is_empty() => {
            live.meta_mut().owner_references = Some(refs.clone());
            true
        }
        _ => false,
    }
}

/// Ensures `desired` exists and matches on every tracked field.
///
/// Creation is attempted first; on conflict the live object is diffed and
/// only written back when something tracked differs.
pub async fn ensure<S, K>(store: &S, owner: &ManagementIngress, mut desired: K) -> Result<Synced, StdError>
where
    S: ObjectStore + ?Sized,
    K: Object + Diffable,
{
    set_owner(owner, &mut desired);
    let (namespace, name) = object_key(&desired)?;
    let kind = K::kind(&()).to_string();

    if store.create(&desired).await? == CreateOutcome::New {
        info!("Created {} '{}'", kind, name);
        return Ok(Synced {
            kind,
            name,
            outcome: SyncOutcome::Created,
        });
    }

    let live: K = store
        .get(&namespace, &name)
        .await?
        .ok_or_else(|| StdError::NotFound {
            kind: kind.clone(),
            name: name.clone(),
        })?;

    let Diff { mut merged, changed } = live.diff_against(&desired);
    let adopted = adopt(&mut merged, &desired);
    if !changed && !adopted {
        info!("No change found for {} '{}'", kind, name);
        return Ok(Synced {
            kind,
            name,
            outcome: SyncOutcome::Unchanged,
        });
    }

    info!("Found change for {} '{}', updating", kind, name);
    store.update(&merged).await?;
    Ok(Synced {
        kind,
        name,
        outcome: SyncOutcome::Updated,
    })
}

/// Creates `desired` unless an object of that name already exists.
///
/// An existing object is never modified, except that an orphan gets the
/// owner reference so deletion of the custom resource still cascades.
pub async fn ensure_created<S, K>(store: &S, owner: &ManagementIngress, mut desired: K) -> Result<Synced, StdError>
where
    S: ObjectStore + ?Sized,
    K: Object,
{
    set_owner(owner, &mut desired);
    let (namespace, name) = object_key(&desired)?;
    let kind = K::kind(&()).to_string();

    if store.create(&desired).await? == CreateOutcome::New {
        info!("Created {} '{}'", kind, name);
        return Ok(Synced {
            kind,
            name,
            outcome: SyncOutcome::Created,
        });
    }

    let mut live: K = store
        .get(&namespace, &name)
        .await?
        .ok_or_else(|| StdError::NotFound {
            kind: kind.clone(),
            name: name.clone(),
        })?;

    if !adopt(&mut live, &desired) {
        info!("{} '{}' already exists", kind, name);
        return Ok(Synced {
            kind,
            name,
            outcome: SyncOutcome::Existing,
        });
    }

    info!("Adopting orphaned {} '{}'", kind, name);
    store.update(&live).await?;
    Ok(Synced {
        kind,
        name,
        outcome: SyncOutcome::Updated,
    })
}
