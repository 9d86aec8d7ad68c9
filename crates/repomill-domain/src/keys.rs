use serde::Serialize;

use crate::tag::{Channel, RepoDescriptor};

/// The signing keys that apply to one repository: the key used by the
/// automated build chain and the key used for developer-signed uploads.
/// On the legacy (dotted) series lines these are the same key.
///
/// Selection is a pure function of (series, dver, channel); nothing here
/// touches keyring state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SigningKeySet {
    pub auto: String,
    pub developer: String,
    pub developer_only: bool,
}

impl SigningKeySet {
    #[must_use]
    pub fn for_descriptor(desc: &RepoDescriptor) -> Self {
        let (auto, developer) = match desc.series_base.as_deref() {
            Some(series) if !series.contains('.') => (
                format!("{}-{}-auto", desc.family, series),
                format!("{}-{}-developer", desc.family, series),
            ),
            // Legacy dotted series shipped a single key per series+dver.
            Some(series) => {
                let key = format!("{}-{}-{}", desc.family, series, desc.dver);
                (key.clone(), key)
            }
            None => {
                let key = format!("{}-{}", desc.family, desc.dver);
                (key.clone(), key)
            }
        };

        // Pre-release channels accept automated-build signatures; the
        // published channels only trust the developer key.
        let developer_only = !matches!(
            desc.channel,
            Some(Channel::Development | Channel::Testing | Channel::Contrib)
        );

        SigningKeySet {
            auto,
            developer,
            developer_only,
        }
    }

    /// Accepted key identifiers, deduplicated, in acceptance order.
    #[must_use]
    pub fn accepted(&self) -> Vec<&str> {
        if self.developer_only || self.auto == self.developer {
            vec![self.developer.as_str()]
        } else {
            vec![self.auto.as_str(), self.developer.as_str()]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_series_split_auto_and_developer_keys() {
        let desc = RepoDescriptor::parse("osg-24-main-el9-testing").unwrap();
        let keys = SigningKeySet::for_descriptor(&desc);
        assert_eq!(keys.auto, "osg-24-auto");
        assert_eq!(keys.developer, "osg-24-developer");
        assert_eq!(keys.accepted(), vec!["osg-24-auto", "osg-24-developer"]);
    }

    #[test]
    fn release_channel_accepts_developer_key_only() {
        let desc = RepoDescriptor::parse("osg-24-main-el9-release").unwrap();
        let keys = SigningKeySet::for_descriptor(&desc);
        assert!(keys.developer_only);
        assert_eq!(keys.accepted(), vec!["osg-24-developer"]);
    }

    #[test]
    fn legacy_series_use_one_key() {
        let desc = RepoDescriptor::parse("osg-3.6-el8-testing").unwrap();
        let keys = SigningKeySet::for_descriptor(&desc);
        assert_eq!(keys.auto, keys.developer);
        assert_eq!(keys.accepted(), vec!["osg-3.6-el8"]);
    }

    #[test]
    fn selection_is_deterministic() {
        let desc = RepoDescriptor::parse("devops-el9-itb").unwrap();
        let a = SigningKeySet::for_descriptor(&desc);
        let b = SigningKeySet::for_descriptor(&desc);
        assert_eq!(a, b);
        assert_eq!(a.accepted(), vec!["devops-el9"]);
    }
}
