//! Ride transition policy.
//!
//! A single table decides which role may move a ride between which
//! statuses. Views ask it which controls to enable, the coordinator asks it
//! before sending a mutation, and the in-memory Ride Service uses it to
//! arbitrate. Nothing here touches the network.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::RideError;
use crate::models::ride::{Ride, RideStatus};
use crate::models::user::{Actor, Role};

/// Extra condition a rule needs from the ride itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// No driver assigned yet.
    Unassigned,
    /// The acting driver is the assigned driver.
    AssignedToActor,
    /// The acting rider requested the ride.
    OwnRide,
    /// The acting rider owns the ride, or the acting driver is assigned to it.
    OwnRideOrAssigned,
    /// The ride has no feedback yet.
    FeedbackAbsent,
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub from: RideStatus,
    pub to: RideStatus,
    pub actors: &'static [Role],
    pub precondition: Precondition,
}

const fn rule(
    from: RideStatus,
    to: RideStatus,
    actors: &'static [Role],
    precondition: Precondition,
) -> TransitionRule {
    TransitionRule { from, to, actors, precondition }
}

/// Every non-administrative transition. `Completed -> Completed` is the
/// one-time feedback attachment.
pub const TRANSITIONS: &[TransitionRule] = &[
    rule(RideStatus::Requested, RideStatus::Accepted, &[Role::Driver], Precondition::Unassigned),
    rule(RideStatus::Requested, RideStatus::Cancelled, &[Role::Rider], Precondition::OwnRide),
    rule(
        RideStatus::Accepted,
        RideStatus::Cancelled,
        &[Role::Rider, Role::Driver],
        Precondition::OwnRideOrAssigned,
    ),
    rule(RideStatus::PickedUp, RideStatus::Cancelled, &[Role::Driver], Precondition::AssignedToActor),
    rule(RideStatus::InTransit, RideStatus::Cancelled, &[Role::Driver], Precondition::AssignedToActor),
    rule(RideStatus::Accepted, RideStatus::PickedUp, &[Role::Driver], Precondition::AssignedToActor),
    rule(RideStatus::PickedUp, RideStatus::InTransit, &[Role::Driver], Precondition::AssignedToActor),
    rule(RideStatus::InTransit, RideStatus::Completed, &[Role::Driver], Precondition::AssignedToActor),
    rule(RideStatus::Completed, RideStatus::Completed, &[Role::Rider], Precondition::FeedbackAbsent),
];

/// Something a viewer can do to a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "target", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideAction {
    Accept,
    /// Driver moves the ride one step forward.
    Advance(RideStatus),
    Cancel,
    AttachFeedback,
    /// Administrative forward jump.
    Override(RideStatus),
}

impl RideAction {
    /// Status the ride ends up in when the action succeeds.
    pub fn target(&self, current: RideStatus) -> RideStatus {
        match self {
            RideAction::Accept => RideStatus::Accepted,
            RideAction::Advance(to) | RideAction::Override(to) => *to,
            RideAction::Cancel => RideStatus::Cancelled,
            RideAction::AttachFeedback => current,
        }
    }

    pub fn label(&self) -> String {
        match self {
            RideAction::Accept => "Accept".to_string(),
            RideAction::Advance(to) => format!("Mark {}", to.label()),
            RideAction::Cancel => "Cancel".to_string(),
            RideAction::AttachFeedback => "Give Feedback".to_string(),
            RideAction::Override(to) => format!("Set {}", to.label()),
        }
    }
}

/// Statuses `role` may move a ride in `current` to.
///
/// Unknown statuses fail closed. Terminal statuses give the empty set,
/// except `Completed` for a rider, which contains `Completed` itself (the
/// feedback attachment).
pub fn legal_next_states(current: RideStatus, role: Role) -> BTreeSet<RideStatus> {
    if role.is_admin() {
        if !current.is_active() {
            return BTreeSet::new();
        }
        return RideStatus::ALL
            .iter()
            .copied()
            .filter(|to| *to == RideStatus::Cancelled || to.is_forward_of(current))
            .collect();
    }

    TRANSITIONS
        .iter()
        .filter(|r| r.from == current && r.actors.contains(&role))
        .map(|r| r.to)
        .collect()
}

fn rule_for(from: RideStatus, to: RideStatus, role: Role) -> Option<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .find(|r| r.from == from && r.to == to && r.actors.contains(&role))
}

fn precondition_holds(precondition: Precondition, ride: &Ride, actor: &Actor) -> bool {
    match precondition {
        Precondition::Unassigned => ride.driver_id.is_none(),
        Precondition::AssignedToActor => ride.is_assigned_to(&actor.id),
        Precondition::OwnRide => ride.rider_id == actor.id,
        Precondition::OwnRideOrAssigned => match actor.role {
            Role::Rider => ride.rider_id == actor.id,
            Role::Driver => ride.is_assigned_to(&actor.id),
            _ => false,
        },
        Precondition::FeedbackAbsent => ride.rider_id == actor.id && !ride.has_feedback(),
    }
}

fn action_for(current: RideStatus, to: RideStatus, role: Role) -> RideAction {
    if to == RideStatus::Cancelled {
        RideAction::Cancel
    } else if role.is_admin() {
        RideAction::Override(to)
    } else if current == RideStatus::Completed && to == RideStatus::Completed {
        RideAction::AttachFeedback
    } else if to == RideStatus::Accepted {
        RideAction::Accept
    } else {
        RideAction::Advance(to)
    }
}

/// Actions `actor` may take on `ride` right now. Always a subset of
/// [`legal_next_states`] for the ride's status and the actor's role.
pub fn legal_actions(ride: &Ride, actor: &Actor) -> Vec<RideAction> {
    legal_next_states(ride.status, actor.role)
        .into_iter()
        .filter(|to| {
            if actor.role.is_admin() {
                // an override may not skip driver assignment
                *to == RideStatus::Cancelled || ride.driver_id.is_some()
            } else {
                rule_for(ride.status, *to, actor.role)
                    .is_some_and(|r| precondition_holds(r.precondition, ride, actor))
            }
        })
        .map(|to| action_for(ride.status, to, actor.role))
        .collect()
}

/// Check `action` against the policy and return the status it leads to.
pub fn authorize(ride: &Ride, actor: &Actor, action: RideAction) -> Result<RideStatus, RideError> {
    let to = action.target(ride.status);

    if legal_actions(ride, actor).contains(&action) {
        return Ok(to);
    }

    // Pick the most specific reason for the rejection.
    match action {
        RideAction::Accept if ride.status.is_active() && ride.driver_id.is_some() => {
            Err(RideError::RideAlreadyAssigned)
        }
        RideAction::AttachFeedback if ride.has_feedback() => Err(RideError::FeedbackAlreadySubmitted),
        _ if legal_next_states(ride.status, actor.role).contains(&to) => Err(RideError::forbidden(
            format!("{} {} may not {} ride {}", actor.role, actor.id, action.label().to_lowercase(), ride.id),
        )),
        _ => Err(RideError::IllegalTransition { from: ride.status, to, role: actor.role }),
    }
}

/// Only riders create rides.
pub fn can_request_ride(role: Role) -> bool {
    role == Role::Rider
}
