use std::fmt;

pub const SEPARATOR: char = '/';

/// A canonical absolute path inside the store.
///
/// The directory always starts and ends with `/` (the root is `/` alone) and
/// the filename never contains `/`. Parsing never fails: any input string maps
/// to some canonical path, with blank input mapping to the root directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath {
    directory: String,
    filename: String,
}

impl VirtualPath {
    pub fn root() -> Self {
        Self {
            directory: SEPARATOR.to_string(),
            filename: String::new(),
        }
    }

    /// Parses `raw` as a file path. A trailing separator yields an empty filename.
    pub fn for_file(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::root();
        }

        let unified: String = trimmed
            .chars()
            .map(|ch| if is_separator(ch) { SEPARATOR } else { ch })
            .collect();
        let ends_with_separator = unified.ends_with(SEPARATOR);

        let mut segments: Vec<&str> = unified
            .split(SEPARATOR)
            .map(str::trim)
            .filter(|seg| !seg.is_empty())
            .collect();

        let filename = if ends_with_separator {
            String::new()
        } else {
            segments.pop().map(str::to_string).unwrap_or_default()
        };

        let mut directory = String::with_capacity(unified.len() + 1);
        directory.push(SEPARATOR);
        for seg in segments {
            directory.push_str(seg);
            directory.push(SEPARATOR);
        }

        Self {
            directory,
            filename,
        }
    }

    /// Parses `raw` as a directory path: the result always has an empty filename.
    pub fn for_directory(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::root();
        }
        Self::for_file(&format!("{trimmed}{SEPARATOR}"))
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn is_directory(&self) -> bool {
        self.filename.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.is_directory() && self.directory.len() == 1
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.directory, self.filename)
    }
}

fn is_separator(ch: char) -> bool {
    ch == SEPARATOR || ch == '\\' || ch == std::path::MAIN_SEPARATOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_inputs_are_root() {
        for raw in ["", " ", "/", " / ", "\t /  ", "//"] {
            let path = VirtualPath::for_directory(raw);
            assert!(path.is_root(), "{raw:?} -> {path}");
            assert_eq!(VirtualPath::for_file(raw).directory(), "/");
        }
    }

    #[test]
    fn separators_are_unified_and_collapsed() {
        let expected = VirtualPath::for_file("/a/b");
        assert_eq!(VirtualPath::for_file("a//b"), expected);
        assert_eq!(VirtualPath::for_file(" /a/b "), expected);
        assert_eq!(VirtualPath::for_file("\\a\\b"), expected);
        assert_eq!(expected.directory(), "/a/");
        assert_eq!(expected.filename(), "b");
    }

    #[test]
    fn leading_separator_is_forced() {
        let path = VirtualPath::for_file("myfile.txt");
        assert_eq!(path.directory(), "/");
        assert_eq!(path.filename(), "myfile.txt");
        assert_eq!(path.to_string(), "/myfile.txt");
    }

    #[test]
    fn trailing_separator_is_preserved() {
        let path = VirtualPath::for_file("a/b/");
        assert_eq!(path.directory(), "/a/b/");
        assert!(path.is_directory());
        assert!(!path.is_root());
    }

    #[test]
    fn segments_are_trimmed() {
        let path = VirtualPath::for_file(" dir 1 / file1.txt ");
        assert_eq!(path.directory(), "/dir 1/");
        assert_eq!(path.filename(), "file1.txt");

        let path = VirtualPath::for_file("/a/ /b");
        assert_eq!(path.to_string(), "/a/b");
    }

    #[test]
    fn for_directory_forces_trailing_separator() {
        for raw in ["dir 1", " dir 1", " dir 1 ", "  dir 1\t ", "/dir 1/", "dir 1\\"] {
            let path = VirtualPath::for_directory(raw);
            assert_eq!(path.directory(), "/dir 1/", "{raw:?}");
            assert_eq!(path.filename(), "");
        }
    }

    #[test]
    fn wildcard_characters_are_kept_verbatim() {
        let path = VirtualPath::for_file("50%_off/deal.txt");
        assert_eq!(path.directory(), "/50%_off/");
        assert_eq!(path.filename(), "deal.txt");
    }
}
