// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Recording notification port.

use std::cell::RefCell;

use warpdrive_core::{NotificationBucket, NotificationPort, RecordIdentifier};

/// One received notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Lid of the notified identifier.
    pub lid: String,
    /// Change bucket.
    pub bucket: NotificationBucket,
    /// Field or attribute name, when given.
    pub key: Option<String>,
}

/// [`NotificationPort`] that keeps every notification for later inspection.
///
/// Share it with the store through an `Rc` and keep a clone in the test.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use warpdrive_dry_tests::{blog_schema, RecordingNotifier};
/// use warpdrive_core::Store;
///
/// let notifier = Rc::new(RecordingNotifier::new());
/// let mut store = Store::builder(Rc::new(blog_schema()))
///     .with_notifier(notifier.clone())
///     .build();
/// store
///     .push_value(serde_json::json!({ "data": { "type": "user", "id": "1" } }))
///     .unwrap();
/// assert_eq!(notifier.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: RefCell<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains and returns everything received so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.seen.borrow_mut())
    }

    /// Number of notifications received and not yet taken.
    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }

    /// Pending notifications for `identifier` in `bucket`.
    pub fn count_for(&self, identifier: &RecordIdentifier, bucket: NotificationBucket) -> usize {
        self.seen
            .borrow()
            .iter()
            .filter(|n| n.lid == identifier.lid() && n.bucket == bucket)
            .count()
    }

    /// Pending relationship notifications for `identifier.field`.
    pub fn count_field(&self, identifier: &RecordIdentifier, field: &str) -> usize {
        self.seen
            .borrow()
            .iter()
            .filter(|n| {
                n.lid == identifier.lid()
                    && n.bucket == NotificationBucket::Relationships
                    && n.key.as_deref() == Some(field)
            })
            .count()
    }
}

impl NotificationPort for RecordingNotifier {
    fn notify(&self, identifier: &RecordIdentifier, bucket: NotificationBucket, key: Option<&str>) {
        self.seen.borrow_mut().push(Notification {
            lid: identifier.lid().to_owned(),
            bucket,
            key: key.map(str::to_owned),
        });
    }
}
