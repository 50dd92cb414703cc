use chrono::{DateTime, Utc};

use crate::api::v1alpha1::{
    ConditionStatus, ConditionType, IngressCondition, ManagementIngressStatus, OperandState, OperandStatus,
};

/// Sets the corresponding condition in conditions to new_condition and returns
/// a tuple containing the new conditions vector and whether it was changed.
///
/// 1. If the condition of the specified type already exists, reason and message
///    are updated. LastTransitionTime only moves when the status flips.
/// 2. If a condition of the specified type does not exist, new_condition is
///    appended as given.
pub fn set_status_condition(
    conditions: &[IngressCondition],
    new_condition: IngressCondition,
) -> (Vec<IngressCondition>, bool) {
    let mut new_conditions = Vec::from(conditions);
    let mut changed = false;

    if let Some(existing) = new_conditions.iter_mut().find(|c| c.type_ == new_condition.type_) {
        if existing.status != new_condition.status {
            existing.status = new_condition.status;
            existing.last_transition_time = new_condition.last_transition_time;
            changed = true;
        }

        if existing.reason != new_condition.reason {
            existing.reason = new_condition.reason;
            changed = true;
        }

        if existing.message != new_condition.message {
            existing.message = new_condition.message;
            changed = true;
        }
    } else {
        new_conditions.push(new_condition);
        changed = true;
    }

    (new_conditions, changed)
}

/// Removes the corresponding condition_type from conditions if present.
/// Returns a tuple containing the new conditions vector and whether any condition was removed.
pub fn remove_status_condition(
    conditions: &[IngressCondition],
    condition_type: ConditionType,
) -> (Vec<IngressCondition>, bool) {
    let mut new_conditions = conditions.to_vec();
    let original_len = new_conditions.len();
    new_conditions.retain(|condition| condition.type_ != condition_type);
    let removed = new_conditions.len() != original_len;
    (new_conditions, removed)
}

/// Finds the condition_type in conditions.
pub fn find_status_condition(
    conditions: &[IngressCondition],
    condition_type: ConditionType,
) -> Option<&IngressCondition> {
    conditions.iter().find(|condition| condition.type_ == condition_type)
}

/// Returns true when the condition_type is present and set to `True`
pub fn is_status_condition_true(conditions: &[IngressCondition], condition_type: ConditionType) -> bool {
    find_status_condition(conditions, condition_type).is_some_and(|c| c.status == ConditionStatus::True)
}

const FAILURE_CONDITIONS: [ConditionType; 3] = [
    ConditionType::ResourceFailedOnCreation,
    ConditionType::WaitingResource,
    ConditionType::DiscoveringClusterInfo,
];

/// Records that every object of `kind` matches its desired state.
pub fn mark_kind_ready(status: &mut ManagementIngressStatus, kind: &str, now: DateTime<Utc>) {
    let current = status.conditions.get(kind).cloned().unwrap_or_default();
    let (mut conditions, _) = set_status_condition(
        &current,
        IngressCondition {
            type_: ConditionType::Ready,
            status: ConditionStatus::True,
            last_transition_time: now,
            reason: "Reconciled".to_string(),
            message: String::new(),
        },
    );
    for failure in FAILURE_CONDITIONS {
        conditions = remove_status_condition(&conditions, failure).0;
    }
    status.conditions.insert(kind.to_string(), conditions);
}

/// Records a failed step for `kind` under the given failure condition.
pub fn mark_kind_failed(
    status: &mut ManagementIngressStatus,
    kind: &str,
    failure: ConditionType,
    message: &str,
    now: DateTime<Utc>,
) {
    let current = status.conditions.get(kind).cloned().unwrap_or_default();
    let (conditions, _) = set_status_condition(
        &current,
        IngressCondition {
            type_: ConditionType::Ready,
            status: ConditionStatus::False,
            last_transition_time: now,
            reason: format!("{failure:?}"),
            message: String::new(),
        },
    );
    let (conditions, _) = set_status_condition(
        &conditions,
        IngressCondition {
            type_: failure,
            status: ConditionStatus::True,
            last_transition_time: now,
            reason: "ReconcileFailed".to_string(),
            message: message.to_string(),
        },
    );
    status.conditions.insert(kind.to_string(), conditions);
}

pub fn set_operand_state(status: &mut ManagementIngressStatus, state: OperandStatus, message: impl Into<String>) {
    status.operand_state = OperandState {
        status: state,
        message: message.into(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn condition(status: ConditionStatus, time: DateTime<Utc>) -> IngressCondition {
        IngressCondition {
            type_: ConditionType::Ready,
            status,
            last_transition_time: time,
            reason: "Testing".to_string(),
            message: "Test message".to_string(),
        }
    }

    #[test]
    fn test_set_status_condition() {
        let (conditions, changed) = set_status_condition(&[], condition(ConditionStatus::True, at(0)));
        assert!(changed);
        assert_eq!(conditions.len(), 1);

        // Same status keeps the original transition time
        let (same, changed) = set_status_condition(&conditions, condition(ConditionStatus::True, at(10)));
        assert!(!changed);
        assert_eq!(same[0].last_transition_time, at(0));

        // Flipping the status moves it
        let (flipped, changed) = set_status_condition(&same, condition(ConditionStatus::False, at(20)));
        assert!(changed);
        assert_eq!(flipped[0].last_transition_time, at(20));
        assert!(!is_status_condition_true(&flipped, ConditionType::Ready));
    }

    #[test]
    fn test_remove_status_condition() {
        let conditions = vec![condition(ConditionStatus::True, at(0))];
        let (removed, changed) = remove_status_condition(&conditions, ConditionType::Ready);
        assert!(changed);
        assert!(removed.is_empty());
        let (_, changed) = remove_status_condition(&removed, ConditionType::Ready);
        assert!(!changed);
    }

    #[test]
    fn failure_then_recovery_clears_failure_condition() {
        let mut status = ManagementIngressStatus::default();
        mark_kind_failed(&mut status, "Route", ConditionType::WaitingResource, "timed out", at(0));
        let route = &status.conditions["Route"];
        assert!(is_status_condition_true(route, ConditionType::WaitingResource));
        assert!(!is_status_condition_true(route, ConditionType::Ready));

        mark_kind_ready(&mut status, "Route", at(30));
        let route = &status.conditions["Route"];
        assert!(is_status_condition_true(route, ConditionType::Ready));
        assert!(find_status_condition(route, ConditionType::WaitingResource).is_none());
        assert_eq!(
            find_status_condition(route, ConditionType::Ready).map(|c| c.last_transition_time),
            Some(at(30))
        );
    }

    #[test]
    fn repeated_ready_is_stable() {
        let mut status = ManagementIngressStatus::default();
        mark_kind_ready(&mut status, "Service", at(0));
        let before = status.clone();
        mark_kind_ready(&mut status, "Service", at(60));
        assert_eq!(status, before);
    }
}
