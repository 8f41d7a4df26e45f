//! Recipe version ordering
//!
//! Versions follow the Gentoo grammar
//! `N(.N)*[letter](_suffix[N])*[-rN]` with suffixes ordered
//! `_alpha < _beta < _pre < _rc < (none) < _p`.

use std::cmp::Ordering;

/// Total order over recipe versions
pub trait VersionComparator: Send + Sync {
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

/// Default Gentoo-style ordering. Strings outside the grammar compare lexically.
#[derive(Debug, Clone, Copy, Default)]
pub struct EbuildVersionOrder;

impl VersionComparator for EbuildVersionOrder {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        match (ParsedVersion::parse(a), ParsedVersion::parse(b)) {
            (Some(a), Some(b)) => a.cmp_to(&b),
            _ => a.cmp(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Suffix {
    Alpha,
    Beta,
    Pre,
    Rc,
    P,
}

impl Suffix {
    // Longer names first so `pre` is not read as `p` + "re".
    const NAMES: [(&'static str, Suffix); 5] = [
        ("alpha", Suffix::Alpha),
        ("beta", Suffix::Beta),
        ("pre", Suffix::Pre),
        ("rc", Suffix::Rc),
        ("p", Suffix::P),
    ];

    fn parse(s: &str) -> Option<(Suffix, &str)> {
        Self::NAMES.iter().find_map(|(name, suffix)| {
            let rest = s.strip_prefix(name)?;
            rest.bytes()
                .all(|b| b.is_ascii_digit())
                .then_some((*suffix, rest))
        })
    }
}

#[derive(Debug)]
struct ParsedVersion<'a> {
    numbers: Vec<&'a str>,
    letter: Option<char>,
    suffixes: Vec<(Suffix, &'a str)>,
    revision: &'a str,
}

impl<'a> ParsedVersion<'a> {
    fn parse(version: &'a str) -> Option<Self> {
        let (main, revision) = match version.rsplit_once("-r") {
            Some((main, rev)) if !rev.is_empty() && rev.bytes().all(|b| b.is_ascii_digit()) => {
                (main, rev)
            }
            _ => (version, "0"),
        };

        let mut pieces = main.split('_');
        let head = pieces.next()?;
        let suffixes = pieces.map(Suffix::parse).collect::<Option<Vec<_>>>()?;

        let (head, letter) = match head.chars().last() {
            Some(c) if c.is_ascii_lowercase() => (&head[..head.len() - 1], Some(c)),
            _ => (head, None),
        };

        let numbers: Vec<&str> = head.split('.').collect();
        if numbers
            .iter()
            .any(|n| n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()))
        {
            return None;
        }

        Some(Self {
            numbers,
            letter,
            suffixes,
            revision,
        })
    }

    fn cmp_to(&self, other: &Self) -> Ordering {
        for (a, b) in self.numbers.iter().zip(&other.numbers) {
            match cmp_digits(a, b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        self.numbers
            .len()
            .cmp(&other.numbers.len())
            .then_with(|| self.letter.cmp(&other.letter))
            .then_with(|| cmp_suffixes(&self.suffixes, &other.suffixes))
            .then_with(|| cmp_digits(self.revision, other.revision))
    }
}

fn cmp_suffixes(a: &[(Suffix, &str)], b: &[(Suffix, &str)]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.0.cmp(&y.0).then_with(|| cmp_digits(x.1, y.1));
        if ord != Ordering::Equal {
            return ord;
        }
    }

    // A trailing `_p` sorts above the bare version; any other suffix sorts below it.
    match a.len().cmp(&b.len()) {
        Ordering::Greater if a[b.len()].0 == Suffix::P => Ordering::Greater,
        Ordering::Greater => Ordering::Less,
        Ordering::Less if b[a.len()].0 == Suffix::P => Ordering::Less,
        Ordering::Less => Ordering::Greater,
        Ordering::Equal => Ordering::Equal,
    }
}

/// Compares unbounded decimal strings without parsing them into integers
fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
