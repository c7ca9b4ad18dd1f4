//! Channel access descriptors.

use std::collections::BTreeSet;
use std::fmt;

use nostr::Event;

/// Who can see a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Anyone can read.
    #[default]
    Public,
    /// Members of the channel's cohorts can read.
    Cohort,
    /// Restricted to the channel's cohorts, like `Cohort`.
    Private,
}

impl Visibility {
    /// Converts to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Cohort => "cohort",
            Self::Private => "private",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "cohort" => Some(Self::Cohort),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who can post to a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AccessType {
    /// Anyone who can read can post.
    Open,
    /// Posting needs a shared cohort.
    #[default]
    Gated,
}

impl AccessType {
    /// Converts to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Gated => "gated",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "gated" => Some(Self::Gated),
            _ => None,
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access metadata of one channel.
///
/// Built once from the channel-creation event and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelAccess {
    /// Channel id (creation event id, hex).
    pub id: String,
    /// Creator public key (hex).
    pub creator_id: String,
    /// Read visibility.
    pub visibility: Visibility,
    /// Post access.
    pub access_type: AccessType,
    /// Cohorts the channel is tied to.
    pub cohorts: BTreeSet<String>,
}

impl ChannelAccess {
    /// Creates a public, gated channel with no cohorts.
    #[must_use]
    pub fn new(id: impl Into<String>, creator_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            creator_id: creator_id.into(),
            visibility: Visibility::default(),
            access_type: AccessType::default(),
            cohorts: BTreeSet::new(),
        }
    }

    /// Sets the visibility.
    #[must_use]
    pub const fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Sets the access type.
    #[must_use]
    pub const fn with_access_type(mut self, access_type: AccessType) -> Self {
        self.access_type = access_type;
        self
    }

    /// Sets the cohorts.
    #[must_use]
    pub fn with_cohorts<I, S>(mut self, cohorts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cohorts = cohorts.into_iter().map(Into::into).collect();
        self
    }

    /// Reads access metadata from a channel-creation event.
    ///
    /// Recognized tags:
    /// - `["visibility", "public" | "cohort" | "private"]`
    /// - `["access", "open" | "gated"]`
    /// - `["cohort", "<name>"]`, repeatable; a value may list several
    ///   comma-separated names
    ///
    /// Missing or unknown values fall back to public and gated.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        let mut access = Self::new(event.id.to_hex(), event.pubkey.to_hex());

        for tag in event.tags.iter() {
            let values = tag.as_slice();
            let (Some(name), Some(value)) = (values.first(), values.get(1)) else {
                continue;
            };
            match name.as_str() {
                "visibility" => {
                    if let Some(visibility) = Visibility::parse(value) {
                        access.visibility = visibility;
                    }
                }
                "access" => {
                    if let Some(access_type) = AccessType::parse(value) {
                        access.access_type = access_type;
                    }
                }
                "cohort" => access.cohorts.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|cohort| !cohort.is_empty())
                        .map(str::to_string),
                ),
                _ => {}
            }
        }

        access
    }
}

#[cfg(test)]
mod tests {
    use nostr::{EventBuilder, Keys, Kind, Tag};

    use super::*;

    fn event_with(tags: &[&[&str]]) -> (Event, Keys) {
        let keys = Keys::generate();
        let tags = tags.iter().map(|t| Tag::parse(t.iter().copied()).unwrap());
        let event = EventBuilder::new(Kind::ChannelCreation, "{}")
            .tags(tags)
            .sign_with_keys(&keys)
            .unwrap();
        (event, keys)
    }

    #[test]
    fn defaults_without_tags() {
        let (event, keys) = event_with(&[]);
        let access = ChannelAccess::from_event(&event);

        assert_eq!(access.id, event.id.to_hex());
        assert_eq!(access.creator_id, keys.public_key().to_hex());
        assert_eq!(access.visibility, Visibility::Public);
        assert_eq!(access.access_type, AccessType::Gated);
        assert!(access.cohorts.is_empty());
    }

    #[test]
    fn reads_tags() {
        let (event, _) = event_with(&[
            &["visibility", "cohort"],
            &["access", "open"],
            &["cohort", "minimoonoir"],
            &["cohort", "cross-access, family"],
        ]);
        let access = ChannelAccess::from_event(&event);

        assert_eq!(access.visibility, Visibility::Cohort);
        assert_eq!(access.access_type, AccessType::Open);
        assert_eq!(
            access.cohorts,
            BTreeSet::from([
                "cross-access".to_string(),
                "family".to_string(),
                "minimoonoir".to_string()
            ])
        );
    }

    #[test]
    fn unknown_values_keep_defaults() {
        let (event, _) = event_with(&[&["visibility", "secret"], &["access", "maybe"]]);
        let access = ChannelAccess::from_event(&event);

        assert_eq!(access.visibility, Visibility::Public);
        assert_eq!(access.access_type, AccessType::Gated);
    }

    #[test]
    fn enum_strings_roundtrip() {
        for v in [Visibility::Public, Visibility::Cohort, Visibility::Private] {
            assert_eq!(Visibility::parse(v.as_str()), Some(v));
        }
        for a in [AccessType::Open, AccessType::Gated] {
            assert_eq!(AccessType::parse(&a.to_string()), Some(a));
        }
    }
}
