use std::fmt;

use serde::Serialize;

/// Maturity/audience classification encoded in the last tag segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Contrib,
    Development,
    Testing,
    Release,
    Rolling,
    Empty,
    Itb,
    Production,
}

impl Channel {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "contrib" => Channel::Contrib,
            "development" => Channel::Development,
            "testing" => Channel::Testing,
            "release" => Channel::Release,
            "rolling" => Channel::Rolling,
            "empty" => Channel::Empty,
            "itb" => Channel::Itb,
            "production" => Channel::Production,
            _ => return None,
        })
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Contrib => "contrib",
            Channel::Development => "development",
            Channel::Testing => "testing",
            Channel::Release => "release",
            Channel::Rolling => "rolling",
            Channel::Empty => "empty",
            Channel::Itb => "itb",
            Channel::Production => "production",
        }
    }

    /// Channels whose contents settle down once published. Their generated
    /// repo definitions carry a `latest=false` marker; churny channels
    /// (development, contrib) do not.
    #[must_use]
    pub fn is_stable(self) -> bool {
        !matches!(self, Channel::Development | Channel::Contrib)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Branch qualifier for the two-digit series lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Main,
    Upcoming,
    Internal,
}

impl Branch {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "main" => Branch::Main,
            "upcoming" => Branch::Upcoming,
            "internal" => Branch::Internal,
            _ => return None,
        })
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Branch::Main => "main",
            Branch::Upcoming => "upcoming",
            Branch::Internal => "internal",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TagParseError {
    #[error(
        "unrecognized tag {0:?}; expected family-series[-branch]-DVER-CHANNEL \
         or family-DVER-CHANNEL (e.g. osg-24-main-el9-release, osg-3.6-el8-testing, \
         devops-el9-itb)"
    )]
    Unrecognized(String),
}

/// Structured view of one build tag, plus every naming/config fact the
/// pipeline derives from it.
///
/// Parsing follows a fixed priority order because the grammars overlap:
/// 1. `family-series-branch-dver-channel` (branch folded into the series)
/// 2. `family-NN-dver-{empty|contrib}` (whole-series meta repo; the channel
///    token folds into the series and the channel is cleared)
/// 3. `family-series-dver-channel`
/// 4. `family-dver-channel` (external partner tags, no series)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RepoDescriptor {
    pub name: String,
    pub family: String,
    /// Series base without branch qualifier ("24", "3.6"); absent for
    /// partner tags.
    pub series_base: Option<String>,
    pub branch: Option<Branch>,
    pub dver: String,
    pub channel: Option<Channel>,
}

fn is_dver(token: &str) -> bool {
    token.len() > 2
        && token.starts_with("el")
        && token[2..].bytes().all(|b| b.is_ascii_digit())
}

fn is_two_digit_series(token: &str) -> bool {
    token.len() == 2 && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_dotted_series(token: &str) -> bool {
    let mut parts = token.splitn(2, '.');
    let (Some(major), Some(minor)) = (parts.next(), parts.next()) else {
        return false;
    };
    !major.is_empty()
        && !minor.is_empty()
        && major.bytes().all(|b| b.is_ascii_digit())
        && minor.bytes().all(|b| b.is_ascii_digit())
}

fn is_series(token: &str) -> bool {
    is_two_digit_series(token) || is_dotted_series(token)
}

impl RepoDescriptor {
    /// Parses a tag name; the first matching grammar wins. No side effects:
    /// unrecognized tags are rejected before anything touches the filesystem.
    pub fn parse(tag: &str) -> Result<Self, TagParseError> {
        let unrecognized = || TagParseError::Unrecognized(tag.to_string());
        let tokens: Vec<&str> = tag.split('-').collect();

        match tokens.as_slice() {
            // family-series-branch-dver-channel
            [family, series, branch, dver, channel]
                if is_series(series) && is_dver(dver) =>
            {
                let branch = Branch::parse(branch).ok_or_else(unrecognized)?;
                let channel = Channel::parse(channel).ok_or_else(unrecognized)?;
                Ok(RepoDescriptor {
                    name: tag.to_string(),
                    family: (*family).to_string(),
                    series_base: Some((*series).to_string()),
                    branch: Some(branch),
                    dver: (*dver).to_string(),
                    channel: Some(channel),
                })
            }
            // family-NN-dver-{empty,contrib}: whole-series meta repos
            [family, series, dver, channel @ ("empty" | "contrib")]
                if is_two_digit_series(series) && is_dver(dver) =>
            {
                Ok(RepoDescriptor {
                    name: tag.to_string(),
                    family: (*family).to_string(),
                    series_base: Some(format!("{series}-{channel}")),
                    branch: None,
                    dver: (*dver).to_string(),
                    channel: None,
                })
            }
            // family-series-dver-channel
            [family, series, dver, channel] if is_series(series) && is_dver(dver) => {
                let channel = Channel::parse(channel).ok_or_else(unrecognized)?;
                Ok(RepoDescriptor {
                    name: tag.to_string(),
                    family: (*family).to_string(),
                    series_base: Some((*series).to_string()),
                    branch: None,
                    dver: (*dver).to_string(),
                    channel: Some(channel),
                })
            }
            // family-dver-channel (external partner, no series)
            [family, dver, channel] if is_dver(dver) => {
                let channel = Channel::parse(channel).ok_or_else(unrecognized)?;
                Ok(RepoDescriptor {
                    name: tag.to_string(),
                    family: (*family).to_string(),
                    series_base: None,
                    branch: None,
                    dver: (*dver).to_string(),
                    channel: Some(channel),
                })
            }
            _ => Err(unrecognized()),
        }
    }

    /// Full series identifier with the branch qualifier attached
    /// ("24-main", "3.5-upcoming", "23-empty").
    #[must_use]
    pub fn series(&self) -> Option<String> {
        let base = self.series_base.as_ref()?;
        Some(match self.branch {
            Some(branch) => format!("{base}-{}", branch.as_str()),
            None => base.clone(),
        })
    }

    /// Dotted series are the legacy x86_64-only lines.
    #[must_use]
    pub fn is_legacy_series(&self) -> bool {
        self.series_base
            .as_deref()
            .is_some_and(|s| s.contains('.'))
    }

    #[must_use]
    pub fn arches(&self) -> &'static [&'static str] {
        if self.is_legacy_series() {
            &["x86_64"]
        } else {
            &["x86_64", "aarch64"]
        }
    }

    /// Whether this tag's repo gets the `<family>-release-latest` alias
    /// repointed after promotion.
    #[must_use]
    pub fn latest_eligible(&self) -> bool {
        matches!(
            self.channel,
            Some(Channel::Release | Channel::Itb | Channel::Production)
        ) && self.branch != Some(Branch::Upcoming)
    }

    /// Strict key enforcement applies only to the newest (non-dotted)
    /// series family.
    #[must_use]
    pub fn strict_keys(&self) -> bool {
        self.series_base.as_deref().is_some_and(|s| !s.contains('.'))
    }

    /// Tag name with non-alphanumeric characters collapsed, used as the
    /// key-namespace token in generated repo definitions.
    #[must_use]
    pub fn key_namespace(&self) -> String {
        self.name.chars().filter(char::is_ascii_alphanumeric).collect()
    }

    #[must_use]
    pub fn title(&self) -> String {
        let family = self.family.to_uppercase();
        let dver = self.dver.to_uppercase();
        match (self.series(), self.channel) {
            (Some(series), Some(channel)) => format!("{family} {series} {dver} {channel}"),
            (Some(series), None) => format!("{family} {series} {dver}"),
            (None, Some(channel)) => format!("{family} {dver} {channel}"),
            (None, None) => format!("{family} {dver}"),
        }
    }
}
