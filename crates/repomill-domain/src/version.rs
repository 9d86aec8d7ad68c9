use std::cmp::Ordering;

/// RPM-style version comparison: versions are split into alternating
/// numeric and alphabetic segments, numeric segments compare as integers
/// (leading zeros ignored), alphabetic segments compare lexically, numeric
/// beats alphabetic, and `~` sorts before everything including the end of
/// the string.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();

    loop {
        // Skip separator characters. Tilde is significant, not a separator.
        while a.first().is_some_and(|&c| !c.is_ascii_alphanumeric() && c != b'~') {
            a = &a[1..];
        }
        while b.first().is_some_and(|&c| !c.is_ascii_alphanumeric() && c != b'~') {
            b = &b[1..];
        }

        // Tilde is "older than anything", including an empty remainder.
        match (a.first(), b.first()) {
            (Some(b'~'), Some(b'~')) => {
                a = &a[1..];
                b = &b[1..];
                continue;
            }
            (Some(b'~'), _) => return Ordering::Less,
            (_, Some(b'~')) => return Ordering::Greater,
            _ => {}
        }

        match (a.is_empty(), b.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        let a_numeric = a[0].is_ascii_digit();
        let b_numeric = b[0].is_ascii_digit();
        // A numeric segment is always newer than an alphabetic one.
        if a_numeric != b_numeric {
            return if a_numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let (a_seg, a_rest) = take_segment(a, a_numeric);
        let (b_seg, b_rest) = take_segment(b, b_numeric);
        let cmp = if a_numeric {
            compare_numeric(a_seg, b_seg)
        } else {
            a_seg.cmp(b_seg)
        };
        if cmp != Ordering::Equal {
            return cmp;
        }
        a = a_rest;
        b = b_rest;
    }
}

fn take_segment(s: &[u8], numeric: bool) -> (&[u8], &[u8]) {
    let end = s
        .iter()
        .position(|c| {
            if numeric {
                !c.is_ascii_digit()
            } else {
                !c.is_ascii_alphabetic()
            }
        })
        .unwrap_or(s.len());
    s.split_at(end)
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|&c| c != b'0').unwrap_or(s.len());
    &s[start..]
}

/// Name/version/release fields split out of a package file name of the
/// shape `name-version-release.arch.rpm`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageName {
    pub name: String,
    pub version: String,
    pub release: String,
}

impl PackageName {
    /// Splits on the last two hyphens; returns `None` for names that do
    /// not look like package files.
    #[must_use]
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".rpm")?;
        let (rest, release) = stem.rsplit_once('-')?;
        let (name, version) = rest.rsplit_once('-')?;
        if name.is_empty() || version.is_empty() || release.is_empty() {
            return None;
        }
        Some(PackageName {
            name: name.to_string(),
            version: version.to_string(),
            release: release.to_string(),
        })
    }
}

/// Version-aware ordering of two package file names. Files that do not
/// parse as packages fall back to plain string comparison, sorting before
/// anything that does parse.
#[must_use]
pub fn compare_package_files(a: &str, b: &str) -> Ordering {
    match (PackageName::parse(a), PackageName::parse(b)) {
        (Some(pa), Some(pb)) => compare_versions(&pa.version, &pb.version)
            .then_with(|| compare_versions(&pa.release, &pb.release))
            .then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}
