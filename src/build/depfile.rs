//! Make-style dependency files (`*.d`) as emitted by `gcc -MMD`.
//!
//! ```text
//! /build/sketch/Blink.ino.cpp.o: /build/sketch/Blink.ino.cpp \
//!  /libs/Servo/src/Servo.h /home/me/my\ libs/Wire.h
//! ```
//!
//! The first item is the target (terminated by `:`), the first prerequisite is
//! the primary source, the remaining ones are headers. Supported escapes:
//! `\ ` (space), `\<TAB>`, `\#`, `\\` and `$$`; a backslash before a newline
//! continues the line. Any other backslash is kept literally, so Windows-ish
//! paths survive.

/// A parsed dependency file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepFile {
    pub object_file: String,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DepFileError {
    #[error("no colon in first item of depfile")]
    NoColon,
    #[error("invalid dollar sequence: ${0}")]
    InvalidDollar(String),
    #[error("unclosed escape sequence at end of depfile")]
    UnclosedEscape,
}

impl DepFile {
    pub fn parse(content: &str) -> Result<Self, DepFileError> {
        let tokens = tokenize(content)?;
        let mut tokens = tokens.into_iter().peekable();

        let Some(first) = tokens.next() else {
            return Ok(DepFile::default());
        };

        let object_file = if let Some(target) = first.strip_suffix(':') {
            target.to_string()
        } else if tokens.peek().is_some_and(|t| t == ":") {
            tokens.next();
            first
        } else {
            return Err(DepFileError::NoColon);
        };

        // With -MP, gcc appends one phony rule per header ("foo.h:"); the
        // prerequisite list of the real target ends where those begin.
        let dependencies = tokens.take_while(|t| !t.ends_with(':')).collect();

        Ok(DepFile {
            object_file,
            dependencies,
        })
    }
}

fn tokenize(content: &str) -> Result<Vec<String>, DepFileError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = content.chars().peekable();

    let flush = |current: &mut String, tokens: &mut Vec<String>| {
        if !current.is_empty() {
            tokens.push(std::mem::take(current));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                None => return Err(DepFileError::UnclosedEscape),
                Some('\n') => flush(&mut current, &mut tokens),
                Some('\r') => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    flush(&mut current, &mut tokens);
                }
                Some(escaped @ (' ' | '\t' | '#' | '\\')) => current.push(escaped),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
            },
            '$' => match chars.next() {
                Some('$') => current.push('$'),
                Some(other) => return Err(DepFileError::InvalidDollar(other.to_string())),
                None => return Err(DepFileError::InvalidDollar(String::new())),
            },
            c if c.is_whitespace() => flush(&mut current, &mut tokens),
            c => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);

    Ok(tokens)
}
