use serde::Serialize;

use crate::tag::{Branch, Channel, RepoDescriptor};

/// Why a tag's series/branch/channel combination cannot be mapped onto the
/// external package namespace. Distinct from "not applicable": an
/// unmappable tag *looks* like it should map and therefore hard-fails.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("no external series mapping for branch {0:?}")]
    UnsupportedBranch(&'static str),
    #[error("no external channel mapping for channel {0:?}")]
    UnsupportedChannel(&'static str),
}

/// Which external channels to pull for a tag, and whether to keep every
/// matching build or only the newest one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelPlan {
    pub channels: Vec<&'static str>,
    pub latest_only: bool,
}

/// A tag's coordinates in the external (Condor-style) package namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CondorMapping {
    /// External series directory, e.g. "24.0" for 24-main, "24.x" for
    /// 24-upcoming.
    pub series_repo: String,
    pub dver: String,
    pub plan: ChannelPlan,
}

/// Maps a descriptor onto the external namespace. Only the newest tag
/// grammar (two-digit series with a branch qualifier) participates;
/// anything else returns `Ok(None)` and the merge step is a no-op.
pub fn condor_mapping(desc: &RepoDescriptor) -> Result<Option<CondorMapping>, MappingError> {
    let (Some(series), Some(branch)) = (desc.series_base.as_deref(), desc.branch) else {
        return Ok(None);
    };
    if series.contains('.') {
        return Ok(None);
    }
    let Some(channel) = desc.channel else {
        return Ok(None);
    };

    let suffix = match branch {
        Branch::Main => "0",
        Branch::Upcoming => "x",
        Branch::Internal => return Err(MappingError::UnsupportedBranch("internal")),
    };

    let plan = match channel {
        Channel::Release => ChannelPlan {
            channels: vec!["release"],
            latest_only: false,
        },
        Channel::Testing => {
            let mut channels = vec!["release", "rc"];
            if branch == Branch::Upcoming {
                channels.push("update");
            }
            ChannelPlan {
                channels,
                latest_only: true,
            }
        }
        Channel::Development => ChannelPlan {
            channels: vec!["daily"],
            latest_only: true,
        },
        other => return Err(MappingError::UnsupportedChannel(other.as_str())),
    };

    Ok(Some(CondorMapping {
        series_repo: format!("{series}.{suffix}"),
        dver: desc.dver.clone(),
        plan,
    }))
}

/// Remote directory for one (channel, arch) pair, relative to the external
/// rsync root.
#[must_use]
pub fn remote_dir(mapping: &CondorMapping, channel: &str, arch: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        mapping.series_repo, mapping.dver, arch, channel
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::RepoDescriptor;

    fn mapping(tag: &str) -> Result<Option<CondorMapping>, MappingError> {
        condor_mapping(&RepoDescriptor::parse(tag).unwrap())
    }

    #[test]
    fn release_pulls_everything_from_release() {
        let m = mapping("osg-24-main-el9-release").unwrap().unwrap();
        assert_eq!(m.series_repo, "24.0");
        assert_eq!(m.plan.channels, vec!["release"]);
        assert!(!m.plan.latest_only);
    }

    #[test]
    fn testing_adds_update_only_for_upcoming() {
        let main = mapping("osg-24-main-el9-testing").unwrap().unwrap();
        assert_eq!(main.plan.channels, vec!["release", "rc"]);
        assert!(main.plan.latest_only);

        let upcoming = mapping("osg-24-upcoming-el9-testing").unwrap().unwrap();
        assert_eq!(upcoming.series_repo, "24.x");
        assert_eq!(upcoming.plan.channels, vec!["release", "rc", "update"]);
    }

    #[test]
    fn development_tracks_daily_latest() {
        let m = mapping("osg-24-main-el9-development").unwrap().unwrap();
        assert_eq!(m.plan.channels, vec!["daily"]);
        assert!(m.plan.latest_only);
    }

    #[test]
    fn tags_outside_the_newest_grammar_are_not_applicable() {
        assert_eq!(mapping("osg-3.6-el8-release").unwrap(), None);
        assert_eq!(mapping("osg-23-el9-empty").unwrap(), None);
        assert_eq!(mapping("devops-el9-itb").unwrap(), None);
        // Dotted series with a branch still falls outside.
        assert_eq!(mapping("osg-3.5-upcoming-el8-testing").unwrap(), None);
    }

    #[test]
    fn unmapped_branch_and_channel_are_hard_errors() {
        assert_eq!(
            mapping("osg-24-internal-el9-release"),
            Err(MappingError::UnsupportedBranch("internal"))
        );
        assert_eq!(
            mapping("osg-24-main-el9-rolling"),
            Err(MappingError::UnsupportedChannel("rolling"))
        );
    }

    #[test]
    fn remote_dirs_follow_the_external_layout() {
        let m = mapping("osg-24-main-el9-release").unwrap().unwrap();
        assert_eq!(remote_dir(&m, "release", "x86_64"), "24.0/el9/x86_64/release");
    }
}
