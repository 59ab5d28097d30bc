//! Classification of raw dependency specs.
//!
//! Version arithmetic is done by `deno_semver`, which speaks the npm range
//! grammar. Only registry ranges (and the ranges embedded in aliases and
//! `#semver:` git references) can be compared against an override key;
//! every other kind is opaque to it.

use deno_semver::{Version, VersionReq};
use lockward_util::errors::{LockwardError, LockwardResult};

/// npm refuses version components above `Number.MAX_SAFE_INTEGER`.
const MAX_COMPONENT: u64 = (1 << 53) - 1;

/// What a raw `package.json` dependency value refers to.
#[derive(Debug, Clone)]
pub enum SpecKind {
    /// A semver range or exact version, e.g. `^1.2.3` or `1.2.3`.
    Range(VersionReq),
    /// `npm:<name>@<spec>`, a different package under this name.
    Alias { name: String, sub: Box<SpecKind> },
    /// A dist-tag such as `latest` or `next`.
    Tag(String),
    /// A git reference, with the range from a `#semver:` fragment if any.
    Git { range: Option<VersionReq> },
    /// A local tarball.
    File,
    /// A local folder.
    Directory,
    /// A tarball URL.
    Remote,
    /// Neither a range nor a valid tag name.
    Invalid,
}

impl SpecKind {
    pub fn classify(raw: &str) -> SpecKind {
        let raw = raw.trim();

        if let Some(rest) = raw.strip_prefix("npm:") {
            return classify_alias(rest);
        }
        if is_git(raw) {
            let range = raw
                .split_once("#semver:")
                .and_then(|(_, r)| parse_range(r).ok())
                .filter(|req| req.tag().is_none());
            return SpecKind::Git { range };
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return SpecKind::Remote;
        }
        if is_local_path(raw) {
            let path = raw.strip_prefix("file:").unwrap_or(raw);
            return if path.ends_with(".tgz") || path.ends_with(".tar.gz") || path.ends_with(".tar")
            {
                SpecKind::File
            } else {
                SpecKind::Directory
            };
        }
        match parse_range(raw) {
            Ok(req) => match req.tag() {
                Some(tag) => SpecKind::Tag(tag.to_string()),
                None => SpecKind::Range(req),
            },
            Err(_) => SpecKind::Invalid,
        }
    }

    /// The range usable for intersection tests, if this kind has one.
    pub fn comparable_range(&self) -> Option<&VersionReq> {
        match self {
            SpecKind::Range(range) => Some(range),
            SpecKind::Alias { sub, .. } => sub.comparable_range(),
            SpecKind::Git { range } => range.as_ref(),
            _ => None,
        }
    }

    /// Kinds that can neither be compared nor accepted blindly by a
    /// qualified override key: git without a `#semver:` range, and specs
    /// that do not parse at all.
    pub fn is_uncomparable(&self) -> bool {
        match self {
            SpecKind::Git { range } => range.is_none(),
            SpecKind::Alias { sub, .. } => sub.is_uncomparable(),
            SpecKind::Invalid => true,
            _ => false,
        }
    }
}

/// Whether `raw` is npm's "any version" range.
pub fn is_any(raw: &str) -> bool {
    matches!(raw.trim(), "" | "*" | "x" | "X")
}

/// Parse an npm range (or dist-tag) with `deno_semver`.
pub fn parse_range(raw: &str) -> LockwardResult<VersionReq> {
    let text = raw.trim();
    let text = if text.is_empty() { "*" } else { text };
    check_components(text).map_err(|message| LockwardError::RangeParse {
        range: raw.to_string(),
        message,
    })?;
    VersionReq::parse_from_npm(text).map_err(|e| LockwardError::RangeParse {
        range: raw.to_string(),
        message: e.to_string(),
    })
}

/// Parse a concrete version the way npm reads `package.json` versions:
/// surrounding whitespace and a leading `v` or `=` are ignored, build
/// metadata does not take part in comparisons.
pub fn parse_version(raw: &str) -> LockwardResult<Version> {
    let text = raw.trim();
    let text = text.strip_prefix('=').unwrap_or(text);
    let text = text.strip_prefix('v').unwrap_or(text);
    let text = text.split_once('+').map_or(text, |(v, _)| v);
    check_components(text).map_err(|message| LockwardError::VersionParse {
        version: raw.to_string(),
        message,
    })?;
    Version::parse_from_npm(text).map_err(|e| LockwardError::VersionParse {
        version: raw.to_string(),
        message: e.to_string(),
    })
}

fn check_components(text: &str) -> Result<(), String> {
    for run in text.split(|c: char| !c.is_ascii_digit()) {
        if run.is_empty() {
            continue;
        }
        match run.parse::<u64>() {
            Ok(n) if n <= MAX_COMPONENT => {}
            _ => return Err(format!("version component {run} is too large")),
        }
    }
    Ok(())
}

fn classify_alias(rest: &str) -> SpecKind {
    // the version separator is the last '@' that is not the scope marker
    let split = rest
        .char_indices()
        .skip(1)
        .filter(|&(_, c)| c == '@')
        .map(|(i, _)| i)
        .last();
    let (name, sub) = match split {
        Some(i) => (&rest[..i], SpecKind::classify(&rest[i + 1..])),
        None => (rest, SpecKind::classify("*")),
    };
    SpecKind::Alias {
        name: name.to_string(),
        sub: Box::new(sub),
    }
}

fn is_git(raw: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "git+", "git://", "github:", "gitlab:", "bitbucket:", "gist:",
    ];
    if PREFIXES.iter().any(|p| raw.starts_with(p)) {
        return true;
    }
    // `user/repo` or `user/repo#ref` shorthand for GitHub
    let path = raw.split('#').next().unwrap_or(raw);
    match path.split_once('/') {
        Some((user, repo)) => {
            !user.is_empty()
                && !repo.is_empty()
                && !repo.contains('/')
                && !user.starts_with(['@', '.', '~'])
                && !path.contains(':')
                && !path.contains(char::is_whitespace)
        }
        None => false,
    }
}

fn is_local_path(raw: &str) -> bool {
    raw.starts_with("file:")
        || raw.starts_with("./")
        || raw.starts_with("../")
        || raw.starts_with('/')
        || raw.starts_with("~/")
        || raw == "."
        || raw == ".."
}
