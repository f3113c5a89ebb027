//! Choosing one library for a missing header.
//!
//! Every candidate gets a priority score built from three parts:
//!
//! | Part | Points |
//! |---|---|
//! | architecture | 1010 listed explicitly, 1000 `*`/none, 0 otherwise |
//! | name vs header | 700 name and folder, 600 either, 500 `-main`, 400 `-master`, 300 prefix, 200 suffix, 100 substring |
//! | location | unmanaged 10000, user 3, platform 2, referenced platform 1, IDE 0 |
//!
//! The highest score wins. Ties go to the closest name by bigram overlap and
//! then to alphabetical order, so the answer never depends on load order.

use super::{Library, LibraryCatalog, LibraryLocation};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default)]
pub struct LibraryResolver {
    headers: BTreeMap<String, Vec<Arc<Library>>>,
}

impl LibraryResolver {
    /// Indexes every header found directly in each library's source folder.
    pub fn new(catalog: &LibraryCatalog) -> Self {
        let mut resolver = Self::default();
        for lib in catalog.libraries() {
            resolver.add(lib.clone());
        }
        resolver
    }

    fn add(&mut self, lib: Arc<Library>) {
        for header in &lib.source_headers {
            let candidates = self.headers.entry(header.clone()).or_default();
            if !candidates.contains(&lib) {
                candidates.push(lib.clone());
            }
        }
    }

    /// Every library exposing `header`, in catalog order.
    pub fn alternatives_for(&self, header: &str) -> &[Arc<Library>] {
        self.headers.get(header).map(Vec::as_slice).unwrap_or_default()
    }

    /// The best library for `header` on `arch`, if any library provides it.
    pub fn resolve_for(&self, header: &str, arch: &str) -> Option<Arc<Library>> {
        debug!(header, arch, "resolving include");

        let mut found: Vec<&Arc<Library>> = Vec::new();
        let mut found_priority = 0;
        for lib in self.alternatives_for(header) {
            let priority = compute_priority(lib, header, arch);
            let verdict = if found.is_empty() || priority > found_priority {
                found.clear();
                found.push(lib);
                found_priority = priority;
                "found better lib"
            } else if priority == found_priority {
                found.push(lib);
                "found another lib with same priority"
            } else {
                "discarded"
            };
            trace!(lib = %lib.name, prio = format!("{:03X}", priority), "{}", verdict);
        }

        match found.len() {
            0 => None,
            1 => Some(found[0].clone()),
            _ => {
                if let Some(best) = closest_name(header, &found) {
                    debug!(lib = %best.name, "library with the best matching name");
                    return Some(best.clone());
                }
                found.sort_by(|a, b| {
                    a.name
                        .cmp(&b.name)
                        .then_with(|| a.install_dir.cmp(&b.install_dir))
                });
                debug!(lib = %found[0].name, "first library in alphabetic order");
                Some(found[0].clone())
            }
        }
    }
}

/// Lowercases and replaces anything outside `[a-z0-9_.-]` with `_`.
fn simplify(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn header_stem(header: &str) -> &str {
    Path::new(header)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(header)
}

/// Priority of `lib` as the provider of `header` on `arch`. Higher wins.
pub fn compute_priority(lib: &Library, header: &str, arch: &str) -> i32 {
    let header = simplify(header_stem(header));
    let name = simplify(&lib.name);
    let dir_name = simplify(&lib.dir_name);

    let mut priority = if lib.is_optimized_for_architecture(arch) {
        1010
    } else if lib.is_architecture_independent() {
        1000
    } else {
        0
    };

    let either = |f: &dyn Fn(&str) -> bool| f(&name) || f(&dir_name);
    priority += if name == header && dir_name == header {
        700
    } else if either(&|n: &str| n == header) {
        600
    } else if either(&|n: &str| n == format!("{header}-main")) {
        500
    } else if either(&|n: &str| n == format!("{header}-master")) {
        400
    } else if either(&|n: &str| n.starts_with(&header)) {
        300
    } else if either(&|n: &str| n.ends_with(&header)) {
        200
    } else if either(&|n: &str| n.contains(&header)) {
        100
    } else {
        0
    };

    priority += match lib.location {
        LibraryLocation::IdeBuiltIn => 0,
        LibraryLocation::ReferencedPlatformBuiltIn => 1,
        LibraryLocation::PlatformBuiltIn => 2,
        LibraryLocation::User => 3,
        LibraryLocation::Unmanaged => 10000,
    };
    priority
}

fn bigrams(s: &str) -> BTreeSet<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// The candidate whose simplified name shares the most bigrams with the
/// header. `None` when the best score is shared.
fn closest_name<'a>(header: &str, candidates: &[&'a Arc<Library>]) -> Option<&'a Arc<Library>> {
    let wanted = bigrams(&simplify(header_stem(header)));
    let mut best: Option<(&'a Arc<Library>, usize)> = None;
    let mut tied = false;
    for &lib in candidates {
        let score = bigrams(&simplify(&lib.name)).intersection(&wanted).count();
        match best {
            Some((_, top)) if score < top => {}
            Some((_, top)) if score == top => tied = true,
            _ => {
                best = Some((lib, score));
                tied = false;
            }
        }
    }
    if tied { None } else { best.map(|(lib, _)| lib) }
}
