//! # Visibility
//!
//! Decides whether a viewer may see a post. Posts outside events and posts of
//! APPROVED events are public; everything else is limited to the author and to
//! volunteers with an active registration for the event.

use std::collections::HashMap;

use domains::models::{ApprovalStatus, Event, EventId, Post, Registration, RegistrationStatus, UserId};

/// A missing `event` for a post that references one is treated as a
/// non-approved event.
pub fn is_visible(
    post: &Post,
    event: Option<&Event>,
    viewer: Option<UserId>,
    registrations: &HashMap<EventId, RegistrationStatus>,
) -> bool {
    let Some(event_id) = post.event_id else {
        return true;
    };
    if event.is_some_and(|e| e.status == ApprovalStatus::Approved) {
        return true;
    }
    let Some(viewer) = viewer else {
        return false;
    };
    if post.author_id == viewer {
        return true;
    }
    registrations
        .get(&event_id)
        .is_some_and(|status| status.grants_visibility())
}

/// Collapses a viewer's registrations into one status per event, preferring a
/// status that grants visibility when a volunteer registered more than once.
pub fn registration_map(registrations: &[Registration]) -> HashMap<EventId, RegistrationStatus> {
    let mut map = HashMap::with_capacity(registrations.len());
    for registration in registrations {
        map.entry(registration.event_id)
            .and_modify(|current: &mut RegistrationStatus| {
                if !current.grants_visibility() && registration.status.grants_visibility() {
                    *current = registration.status;
                }
            })
            .or_insert(registration.status);
    }
    map
}
