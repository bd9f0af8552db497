//! Event visibility and vendor application workflow.

use serde::Serialize;

use crate::errors::GrubanaError;
use crate::models::{ApplicationStatus, Event, EventStatus, VendorApplication};

impl EventStatus {
    /// Statuses under which customers see an event
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            EventStatus::Published | EventStatus::Active | EventStatus::Upcoming | EventStatus::Live
        )
    }
}

impl Event {
    /// Shown to customers when public and placed at a valid coordinate
    pub fn is_visible_to_customers(&self) -> bool {
        self.status.is_public() && self.coordinate.is_some()
    }
}

/// Events customers may see in a snapshot
pub fn visible_events<'a, I>(events: I) -> Vec<&'a Event>
where
    I: IntoIterator<Item = &'a Event>,
{
    events
        .into_iter()
        .filter(|e| e.is_visible_to_customers())
        .collect()
}

impl ApplicationStatus {
    /// Organizer-driven transitions. Approved and rejected are final.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        matches!(
            (*self, next),
            (Pending, Approved | Rejected | Waitlisted) | (Waitlisted, Approved | Rejected)
        )
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ApplicationStatus::Approved | ApplicationStatus::Rejected)
    }
}

/// Who a notification goes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "address", rename_all = "camelCase")]
pub enum Recipient {
    /// Resolved to an email address by the dispatcher
    Organizer(String),
    Email(String),
    /// In-app message to a user id
    User(String),
}

/// Email queued for external delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient: Recipient,
    pub subject: String,
    pub body: String,
}

impl VendorApplication {
    /// Move to `next`, leaving the record untouched on an illegal transition.
    pub fn transition(&mut self, next: ApplicationStatus) -> Result<(), GrubanaError> {
        if !self.status.can_transition_to(next) {
            return Err(GrubanaError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// The organizer and vendor emails sent when an application is created.
    ///
    /// `event` is the application's event when it is known.
    pub fn creation_notifications(&self, event: Option<&Event>) -> [Notification; 2] {
        let title = event
            .map(|e| e.title.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or("your event");
        let organizer = event
            .map(|e| e.organizer_id.clone())
            .unwrap_or_default();
        let equipment = self.equipment_type.as_deref().unwrap_or("unspecified");

        [
            Notification {
                recipient: Recipient::Organizer(organizer),
                subject: format!("New vendor application for {title}"),
                body: format!(
                    "{} ({}) applied to {title} with equipment: {equipment}.",
                    self.business_name, self.contact_email
                ),
            },
            Notification {
                recipient: Recipient::Email(self.contact_email.clone()),
                subject: format!("Application received: {title}"),
                body: format!(
                    "Thanks {}, your application to {title} is {}. The organizer will review it soon.",
                    self.business_name, self.status
                ),
            },
        ]
    }
}
