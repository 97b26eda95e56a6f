//! Per-target compile information
//!
//! Derived from the compile command of the target's first source file: the
//! compiler, `-D` defines, `-I` include directories and the remaining flags.
//! The implicit (system) include path comes from a verbose preprocessor run
//! of the compiler on empty input.

use std::path::{Path, PathBuf};

use super::paths;
use super::target::Language;

/// Line after which the compiler lists its system include directories
pub const SEARCH_LIST_START: &str = "#include <...> search starts here:";
/// Line closing the system include list
pub const SEARCH_LIST_END: &str = "End of search list.";

/// Compiler, defines, explicit include directories and other flags of a target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileInfo {
    pub compiler: String,
    /// Defines without the leading `-D`
    pub defines: Vec<String>,
    /// Explicit include directories, absolute
    pub include_dirs: Vec<PathBuf>,
    /// Arguments that are neither defines nor include directories
    pub flags: Vec<String>,
}

impl CompileInfo {
    /// Split a compile command; relative include directories are resolved against `directory`
    pub fn from_arguments(arguments: &[String], directory: &Path) -> Self {
        let Some((compiler, rest)) = arguments.split_first() else {
            return Self::default();
        };

        let mut info = CompileInfo {
            compiler: compiler.clone(),
            ..Self::default()
        };

        let mut args = rest.iter();
        while let Some(arg) = args.next() {
            if let Some(define) = arg.strip_prefix("-D") {
                match define {
                    "" => info.defines.extend(args.next().cloned()),
                    define => info.defines.push(define.to_string()),
                }
            } else if let Some(dir) = arg.strip_prefix("-I") {
                let dir = match dir {
                    "" => match args.next() {
                        Some(next) => next.as_str(),
                        None => break,
                    },
                    dir => dir,
                };
                info.include_dirs.push(paths::absolutize(Path::new(dir), directory));
            } else {
                info.flags.push(arg.clone());
            }
        }
        info
    }

    pub fn is_empty(&self) -> bool {
        self.compiler.is_empty()
    }

    /// Language implied by the compiler name; plain C when unknown
    pub fn language(&self) -> Language {
        Language::from_compiler(&self.compiler)
    }

    /// Flags joined the way the codemodel reply carries them
    pub fn compile_flags(&self) -> String {
        self.flags.join(" ")
    }
}

/// Parse the include search list from a verbose preprocessor run's stderr
pub fn parse_implicit_includes(stderr: &str) -> Vec<PathBuf> {
    stderr
        .lines()
        .skip_while(|line| line.trim_end() != SEARCH_LIST_START)
        .skip(1)
        .take_while(|line| line.trim_end() != SEARCH_LIST_END)
        .map(|line| {
            let line = line.trim();
            // clang on macOS tags framework directories
            let line = line.strip_suffix(" (framework directory)").unwrap_or(line);
            absolute(Path::new(line))
        })
        .collect()
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path)
        .map(|p| paths::normalize(&p))
        .unwrap_or_else(|_| paths::normalize(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_split_compile_command() {
        let info = CompileInfo::from_arguments(
            &args("c++ -Iapp@exe -I../s/include -DNDEBUG -D VERSION=2 -O2 -std=c++17 -o app.o -c ../s/main.cpp"),
            Path::new("/work/b"),
        );

        assert_eq!(info.compiler, "c++");
        assert_eq!(info.language(), Language::Cxx);
        assert_eq!(info.defines, vec!["NDEBUG", "VERSION=2"]);
        assert_eq!(
            info.include_dirs,
            vec![PathBuf::from("/work/b/app@exe"), PathBuf::from("/work/s/include")]
        );
        assert_eq!(info.compile_flags(), "-O2 -std=c++17 -o app.o -c ../s/main.cpp");
    }

    #[test]
    fn test_separate_include_argument() {
        let info = CompileInfo::from_arguments(&args("cc -I /opt/inc -c a.c"), Path::new("/b"));
        assert_eq!(info.include_dirs, vec![PathBuf::from("/opt/inc")]);
        assert_eq!(info.language(), Language::C);
    }

    #[test]
    fn test_empty_command_is_empty_info() {
        let info = CompileInfo::from_arguments(&[], Path::new("/b"));
        assert!(info.is_empty());
        assert_eq!(info.compile_flags(), "");
    }

    #[test]
    fn test_parse_implicit_includes() {
        let stderr = "\
Using built-in specs.
#include \"...\" search starts here:
#include <...> search starts here:
 /usr/lib/gcc/x86_64-linux-gnu/12/include
 /usr/local/include
 /usr/lib/gcc/x86_64-linux-gnu/12/../../../../include
 /System/Library/Frameworks (framework directory)
End of search list.
 /not/included
";
        assert_eq!(
            parse_implicit_includes(stderr),
            vec![
                PathBuf::from("/usr/lib/gcc/x86_64-linux-gnu/12/include"),
                PathBuf::from("/usr/local/include"),
                PathBuf::from("/usr/include"),
                PathBuf::from("/System/Library/Frameworks"),
            ]
        );
    }

    #[test]
    fn test_parse_without_markers() {
        assert!(parse_implicit_includes("cc: error: unrecognized option\n").is_empty());
    }
}
