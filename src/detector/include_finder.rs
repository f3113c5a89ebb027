//! Extracting the missing header from preprocessor diagnostics.

use regex::Regex;
use std::sync::LazyLock;

/// `fatal error: Servo.h: No such file or directory` (gcc) and
/// `fatal error: 'Servo.h' file not found` (clang).
static FATAL_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"fatal error: '?([^'\s:]+)'?(?:: No such file or directory| file not found)").unwrap()
});

/// The source line gcc echoes under the error, with or without the
/// `  12 | ` gutter of newer releases.
static INCLUDE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(?:\d+\s*\|\s*)?#[ \t]*include\s*[<"](\S+)[">]"#).unwrap()
});

/// The first header the preprocessor could not find, if any.
pub fn find_missing_include(stderr: &str) -> Option<String> {
    for re in [&*FATAL_ERROR, &*INCLUDE_LINE] {
        if let Some(m) = re.captures(stderr).and_then(|c| c.get(1)) {
            return Some(m.as_str().trim().to_string());
        }
    }
    find_include_for_old_compilers(stderr)
}

/// Older toolchains print `file:line: fatal error: header: message`.
fn find_include_for_old_compilers(stderr: &str) -> Option<String> {
    for line in stderr.lines() {
        let parts: Vec<&str> = line.split(':').collect();
        for (i, part) in parts.iter().enumerate() {
            if part.contains("fatal error")
                && let Some(next) = parts.get(i + 1)
            {
                let header = next.trim();
                if !header.is_empty() {
                    return Some(header.to_string());
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcc_message() {
        let stderr = "/tmp/build/sketch/Blink.ino.cpp:1:10: fatal error: Servo.h: No such file or directory\n    1 | #include <Servo.h>\n      |          ^~~~~~~~~\ncompilation terminated.\n";
        assert_eq!(find_missing_include(stderr).as_deref(), Some("Servo.h"));
    }

    #[test]
    fn test_clang_message() {
        let stderr = "main.cpp:3:10: fatal error: 'Adafruit_Sensor.h' file not found\n#include <Adafruit_Sensor.h>\n         ^\n";
        assert_eq!(find_missing_include(stderr).as_deref(), Some("Adafruit_Sensor.h"));
    }

    #[test]
    fn test_nested_header_path() {
        let stderr = "x.cpp:2:10: fatal error: utility/twi.h: No such file or directory\n";
        assert_eq!(find_missing_include(stderr).as_deref(), Some("utility/twi.h"));
    }

    #[test]
    fn test_include_line_only() {
        let stderr = "some unexpected wording\n #include \"Wire.h\"\n";
        assert_eq!(find_missing_include(stderr).as_deref(), Some("Wire.h"));
    }

    #[test]
    fn test_old_compiler_fallback() {
        let stderr = "sketch.cpp:5: fatal error: SPI.h : cannot open\n";
        assert_eq!(find_missing_include(stderr).as_deref(), Some("SPI.h"));
    }

    #[test]
    fn test_patterns_compile() {
        assert_eq!(FATAL_ERROR.captures_len(), 2);
        assert_eq!(INCLUDE_LINE.captures_len(), 2);
    }

    #[test]
    fn test_no_missing_header() {
        assert_eq!(find_missing_include("main.cpp:3:1: error: expected ';'\n"), None);
        assert_eq!(find_missing_include(""), None);
    }
}
