//! Loading a single library folder.

use super::{Library, LibraryLayout, LibraryLocation};
use crate::build::files::{HEADER_EXTENSIONS, has_extension};
use anyhow::{Context, Result, bail};
use semver::Version;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads the library installed in `dir`.
///
/// Folders with a `library.properties` are 1.5-format libraries; anything
/// else must at least contain a header to count as a legacy library.
pub fn load(dir: &Path, location: LibraryLocation) -> Result<Library> {
    let dir = absolute(dir)?;
    if dir.join("library.properties").is_file() {
        load_properties_library(&dir, location)
    } else {
        load_legacy_library(&dir, location)
    }
}

fn absolute(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(dir))
}

fn load_properties_library(dir: &Path, location: LibraryLocation) -> Result<Library> {
    let path = dir.join("library.properties");
    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut properties = parse_properties(&content);

    if !properties.contains_key("maintainer")
        && let Some(email) = properties.get("email").cloned()
    {
        properties.insert("maintainer".to_string(), email);
    }
    let architectures = match properties.get("architectures") {
        Some(list) if !list.trim().is_empty() => comma_list(list),
        _ => vec!["*".to_string()],
    };

    let mut library = Library::new(
        properties.get("name").map(String::as_str).unwrap_or_default(),
        dir,
        location,
    );
    if dir.join("src").is_dir() {
        library.layout = LibraryLayout::Recursive;
        library.source_dir = dir.join("src");
    } else {
        library.layout = LibraryLayout::Flat;
        library.source_dir = dir.to_path_buf();
    }
    // Recorded for both layouts; a recursive library with `utility/` fails
    // validation instead of silently ignoring the folder.
    library.utility_dir = utility_dir(dir);

    let get = |key: &str| properties.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
    library.architectures = architectures;
    library.version = parse_version(&get("version"));
    library.author = get("author");
    library.maintainer = get("maintainer");
    library.sentence = get("sentence");
    library.url = get("url");
    library.dot_a_linkage = get("dot_a_linkage") == "true";
    library.ld_flags = get("ldflags");
    let precompiled = get("precompiled");
    library.precompiled_with_sources = precompiled == "full";
    library.precompiled = precompiled == "true" || library.precompiled_with_sources;
    if let Some(includes) = properties.get("includes").filter(|s| !s.trim().is_empty()) {
        library.declared_headers = comma_list(includes);
    }
    library.source_headers = headers_in(&library.source_dir)?;
    library.properties = properties;
    Ok(library)
}

fn load_legacy_library(dir: &Path, location: LibraryLocation) -> Result<Library> {
    let headers = headers_in(dir)?;
    if headers.is_empty() {
        bail!("invalid library {}: no header files found", dir.display());
    }
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut library = Library::new(&name, dir, location);
    library.is_legacy = true;
    library.utility_dir = utility_dir(dir);
    library.source_headers = headers;
    Ok(library)
}

fn utility_dir(dir: &Path) -> Option<PathBuf> {
    let utility = dir.join("utility");
    utility.is_dir().then_some(utility)
}

/// Header file names directly inside `dir`, sorted.
fn headers_in(dir: &Path) -> Result<Vec<String>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read library folder {}", dir.display()))?;
    let mut headers = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && has_extension(&path, HEADER_EXTENSIONS) {
            headers.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    headers.sort();
    Ok(headers)
}

/// Parses `key=value` lines; `#` starts a comment line.
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    map
}

fn comma_list(s: &str) -> Vec<String> {
    s.split(',').map(|e| e.trim().to_string()).collect()
}

/// Accepts `1`, `1.2` and `v1.2.3` on top of strict semver.
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if raw.is_empty() {
        return None;
    }
    if let Ok(v) = Version::parse(raw) {
        return Some(v);
    }
    let (core, rest) = match raw.find(['-', '+']) {
        Some(i) => raw.split_at(i),
        None => (raw, ""),
    };
    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&format!("{}{}", parts.join("."), rest)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_recursive_library() {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("Servo");
        write(
            &lib_dir.join("library.properties"),
            "name=Servo\nversion=1.2\nauthor=Arduino\nemail=dev@example.com\narchitectures=avr, samd\nprecompiled=full\n",
        );
        write(&lib_dir.join("src").join("Servo.h"), "");
        write(&lib_dir.join("src").join("Servo.cpp"), "");
        write(&lib_dir.join("src").join("avr").join("ServoTimers.h"), "");

        let lib = load(&lib_dir, LibraryLocation::User).unwrap();
        assert_eq!(lib.name, "Servo");
        assert_eq!(lib.dir_name, "Servo");
        assert_eq!(lib.layout, LibraryLayout::Recursive);
        assert_eq!(lib.source_dir, lib_dir.join("src"));
        assert_eq!(lib.architectures, vec!["avr", "samd"]);
        assert_eq!(lib.maintainer, "dev@example.com");
        assert_eq!(lib.version, Some(Version::new(1, 2, 0)));
        assert!(lib.precompiled && lib.precompiled_with_sources);
        assert_eq!(lib.source_headers, vec!["Servo.h"]);
        assert!(lib.validate().is_ok());
    }

    #[test]
    fn test_load_flat_library_with_utility() {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("Wire");
        write(
            &lib_dir.join("library.properties"),
            "name=Wire\nversion=1.0\nauthor=a\nmaintainer=m\nincludes=Wire.h\n",
        );
        write(&lib_dir.join("Wire.h"), "");
        write(&lib_dir.join("utility").join("twi.c"), "");

        let lib = load(&lib_dir, LibraryLocation::PlatformBuiltIn).unwrap();
        assert_eq!(lib.layout, LibraryLayout::Flat);
        assert_eq!(lib.source_dir, lib_dir);
        assert_eq!(lib.utility_dir, Some(lib_dir.join("utility")));
        assert_eq!(lib.architectures, vec!["*"]);
        assert_eq!(lib.declared_headers(), ["Wire.h".to_string()]);
    }

    #[test]
    fn test_load_legacy_library() {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("OldLib");
        write(&lib_dir.join("OldLib.h"), "");

        let lib = load(&lib_dir, LibraryLocation::User).unwrap();
        assert!(lib.is_legacy);
        assert_eq!(lib.name, "OldLib");
        assert!(lib.is_architecture_independent());
    }

    #[test]
    fn test_folder_without_headers_is_not_a_library() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("README.md"), "");
        assert!(load(dir.path(), LibraryLocation::User).is_err());
    }

    #[test]
    fn test_missing_mandatory_property_is_kept_missing() {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("Bad");
        write(&lib_dir.join("library.properties"), "name=Bad\nversion=1.0.0\n");
        write(&lib_dir.join("Bad.h"), "");
        let lib = load(&lib_dir, LibraryLocation::User).unwrap();
        assert!(lib.validate().is_err());
    }

    #[test]
    fn test_parse_properties_and_versions() {
        let props = parse_properties("# comment\nname = Foo\n\nurl=http://x?a=b\n");
        assert_eq!(props.get("name").unwrap(), "Foo");
        assert_eq!(props.get("url").unwrap(), "http://x?a=b");

        assert_eq!(parse_version("1"), Some(Version::new(1, 0, 0)));
        assert_eq!(parse_version("v2.3.4"), Some(Version::new(2, 3, 4)));
        assert_eq!(parse_version("1.0-beta").map(|v| v.pre.to_string()), Some("beta".into()));
        assert_eq!(parse_version("latest"), None);
        assert_eq!(parse_version(""), None);
    }
}
