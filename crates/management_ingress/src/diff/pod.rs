//! Field comparisons for pod templates.
//!
//! Each helper answers "does live differ from desired" for one tracked field;
//! the merge itself is done by the caller so untracked live fields survive.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, PodSpec, ResourceFieldSelector, ResourceRequirements, Toleration,
    Volume,
};

fn toleration_same(lhs: &Toleration, rhs: &Toleration) -> bool {
    lhs.key == rhs.key
        && lhs.operator == rhs.operator
        && lhs.value == rhs.value
        && lhs.effect == rhs.effect
        && lhs.toleration_seconds == rhs.toleration_seconds
}

/// Order-insensitive toleration comparison.
pub fn tolerations_equal(lhs: &[Toleration], rhs: &[Toleration]) -> bool {
    lhs.len() == rhs.len()
        && lhs.iter().all(|l| rhs.iter().any(|r| toleration_same(l, r)))
        && rhs.iter().all(|r| lhs.iter().any(|l| toleration_same(l, r)))
}

fn resource_field_equal(lhs: &ResourceFieldSelector, rhs: &ResourceFieldSelector) -> bool {
    lhs.container_name == rhs.container_name && lhs.resource == rhs.resource && lhs.divisor == rhs.divisor
}

/// Two value-from sources are equal when they reference the same kind of source with the same content.
pub fn env_source_equal(lhs: &EnvVarSource, rhs: &EnvVarSource) -> bool {
    let same_shape = lhs.field_ref.is_some() == rhs.field_ref.is_some()
        && lhs.resource_field_ref.is_some() == rhs.resource_field_ref.is_some()
        && lhs.config_map_key_ref.is_some() == rhs.config_map_key_ref.is_some()
        && lhs.secret_key_ref.is_some() == rhs.secret_key_ref.is_some();
    if !same_shape {
        return false;
    }

    let resource_fields = match (&lhs.resource_field_ref, &rhs.resource_field_ref) {
        (Some(l), Some(r)) => resource_field_equal(l, r),
        _ => true,
    };

    lhs.field_ref == rhs.field_ref
        && resource_fields
        && lhs.config_map_key_ref == rhs.config_map_key_ref
        && lhs.secret_key_ref == rhs.secret_key_ref
}

/// Every name on either side also appears on the other.
fn same_names<T>(lhs: &[T], rhs: &[T], name: impl Fn(&T) -> &str) -> bool {
    lhs.iter().all(|l| rhs.iter().any(|r| name(r) == name(l)))
        && rhs.iter().all(|r| lhs.iter().any(|l| name(l) == name(r)))
}

/// Compares environment variables by name, ignoring their order.
pub fn env_equal(lhs: &[EnvVar], rhs: &[EnvVar]) -> bool {
    if lhs.len() != rhs.len() || !same_names(lhs, rhs, |e| e.name.as_str()) {
        return false;
    }
    lhs.iter().all(|l| {
        let Some(r) = rhs.iter().find(|r| r.name == l.name) else {
            return false;
        };
        if l.value.as_deref().unwrap_or_default() != r.value.as_deref().unwrap_or_default() {
            return false;
        }
        match (&l.value_from, &r.value_from) {
            (None, None) => true,
            (Some(ls), Some(rs)) => env_source_equal(ls, rs),
            _ => false,
        }
    })
}

/// Volumes match by name when both sides point at the same secret, config map or host path.
pub fn volumes_equivalent(lhs: &[Volume], rhs: &[Volume]) -> bool {
    if lhs.len() != rhs.len() || !same_names(lhs, rhs, |v| v.name.as_str()) {
        return false;
    }
    let rhs_by_name: BTreeMap<&str, &Volume> = rhs.iter().map(|v| (v.name.as_str(), v)).collect();

    lhs.iter().all(|l| {
        let Some(r) = rhs_by_name.get(l.name.as_str()) else {
            return false;
        };
        if let (Some(ls), Some(rs)) = (&l.secret, &r.secret) {
            return ls.secret_name == rs.secret_name;
        }
        if let (Some(lc), Some(rc)) = (&l.config_map, &r.config_map) {
            return lc.name == rc.name;
        }
        if let (Some(lh), Some(rh)) = (&l.host_path, &r.host_path) {
            return lh.path == rh.path;
        }
        false
    })
}

fn resources_equal(lhs: &Option<ResourceRequirements>, rhs: &Option<ResourceRequirements>) -> bool {
    let empty = ResourceRequirements::default();
    let l = lhs.as_ref().unwrap_or(&empty);
    let r = rhs.as_ref().unwrap_or(&empty);
    option_maps_equal(&l.limits, &r.limits) && option_maps_equal(&l.requests, &r.requests)
}

/// Compares two optional maps, treating an absent map as empty.
pub fn option_maps_equal<V: PartialEq>(lhs: &Option<BTreeMap<String, V>>, rhs: &Option<BTreeMap<String, V>>) -> bool {
    match (lhs, rhs) {
        (Some(l), Some(r)) => l == r,
        (Some(m), None) | (None, Some(m)) => m.is_empty(),
        (None, None) => true,
    }
}

/// Merges the tracked container fields of `desired` into name-matched containers of `live`.
///
/// Containers that only exist on one side are left alone.
pub fn merge_containers(live: &mut [Container], desired: &[Container]) -> bool {
    let mut changed = false;
    for current in live.iter_mut() {
        let Some(want) = desired.iter().find(|d| d.name == current.name) else {
            continue;
        };

        if current.image != want.image {
            current.image = want.image.clone();
            changed = true;
        }

        if !resources_equal(&current.resources, &want.resources) {
            current.resources = want.resources.clone();
            changed = true;
        }

        let live_env = current.env.as_deref().unwrap_or_default();
        let want_env = want.env.as_deref().unwrap_or_default();
        if !env_equal(live_env, want_env) {
            current.env = want.env.clone();
            changed = true;
        }

        let live_mounts = current.volume_mounts.as_deref().unwrap_or_default();
        let want_mounts = want.volume_mounts.as_deref().unwrap_or_default();
        if live_mounts != want_mounts {
            current.volume_mounts = want.volume_mounts.clone();
            changed = true;
        }
    }
    changed
}

/// Merges the tracked pod-level fields of `desired` into `live`.
pub fn merge_pod_spec(live: &mut PodSpec, desired: &PodSpec) -> bool {
    let mut changed = false;

    if !option_maps_equal(&live.node_selector, &desired.node_selector) {
        live.node_selector = desired.node_selector.clone();
        changed = true;
    }

    let live_tolerations = live.tolerations.as_deref().unwrap_or_default();
    let want_tolerations = desired.tolerations.as_deref().unwrap_or_default();
    if !tolerations_equal(live_tolerations, want_tolerations) {
        live.tolerations = desired.tolerations.clone();
        changed = true;
    }

    if merge_containers(&mut live.containers, &desired.containers) {
        changed = true;
    }

    let live_volumes = live.volumes.as_deref().unwrap_or_default();
    let want_volumes = desired.volumes.as_deref().unwrap_or_default();
    if !volumes_equivalent(live_volumes, want_volumes) {
        live.volumes = desired.volumes.clone();
        changed = true;
    }

    changed
}
