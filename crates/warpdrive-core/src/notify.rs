// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Notification port: fan-out of changes to external observers.
use crate::ident::RecordIdentifier;

/// What kind of change a notification describes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum NotificationBucket {
    /// A relationship field's observable state changed.
    Relationships,
    /// An attribute changed.
    Attributes,
    /// The identifier's id was assigned or it was merged.
    Identity,
    /// Some other record-level property changed.
    Property,
    /// A record became available.
    Added,
    /// A record was unloaded.
    Removed,
}

impl NotificationBucket {
    /// Stable lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relationships => "relationships",
            Self::Attributes => "attributes",
            Self::Identity => "identity",
            Self::Property => "property",
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

/// Receives change notifications. Implementations typically forward to a
/// UI signal layer.
pub trait NotificationPort {
    /// One change for `identifier`; `key` names the field when known.
    fn notify(&self, identifier: &RecordIdentifier, bucket: NotificationBucket, key: Option<&str>);
}

/// Discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNotifier;

impl NotificationPort for NullNotifier {
    fn notify(&self, _identifier: &RecordIdentifier, _bucket: NotificationBucket, _key: Option<&str>) {}
}
