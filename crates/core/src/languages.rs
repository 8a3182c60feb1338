use serde::Serialize;

/// A `(language, version)` pair understood by the remote execution API.
#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
pub struct Runtime {
    pub language: &'static str,
    pub version: &'static str,
}

/// Static description of one language the editor can run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LanguageConfig {
    pub id: &'static str,
    pub label: &'static str,
    pub monaco_language: &'static str,
    pub runtime: Runtime,
    pub default_code: &'static str,
}

pub const DEFAULT_LANGUAGE: &str = "javascript";

const LANGUAGES: &[LanguageConfig] = &[
    LanguageConfig {
        id: "javascript",
        label: "JavaScript",
        monaco_language: "javascript",
        runtime: Runtime {
            language: "javascript",
            version: "18.15.0",
        },
        default_code: r#"const numbers = [1, 2, 3, 4, 5];
const squares = numbers.map((n) => n * n);
console.log("squares:", squares);
"#,
    },
    LanguageConfig {
        id: "typescript",
        label: "TypeScript",
        monaco_language: "typescript",
        runtime: Runtime {
            language: "typescript",
            version: "5.0.3",
        },
        default_code: r#"const numbers: number[] = [1, 2, 3, 4, 5];
const total: number = numbers.reduce((acc, n) => acc + n, 0);
console.log(`total: ${total}`);
"#,
    },
    LanguageConfig {
        id: "python",
        label: "Python",
        monaco_language: "python",
        runtime: Runtime {
            language: "python",
            version: "3.10.0",
        },
        default_code: r#"numbers = [1, 2, 3, 4, 5]
print("squares:", [n * n for n in numbers])
"#,
    },
    LanguageConfig {
        id: "java",
        label: "Java",
        monaco_language: "java",
        runtime: Runtime {
            language: "java",
            version: "15.0.2",
        },
        default_code: r#"public class Main {
    public static void main(String[] args) {
        int total = 0;
        for (int n = 1; n <= 5; n++) {
            total += n;
        }
        System.out.println("total: " + total);
    }
}
"#,
    },
    LanguageConfig {
        id: "go",
        label: "Go",
        monaco_language: "go",
        runtime: Runtime {
            language: "go",
            version: "1.16.2",
        },
        default_code: r#"package main

import "fmt"

func main() {
	total := 0
	for n := 1; n <= 5; n++ {
		total += n
	}
	fmt.Println("total:", total)
}
"#,
    },
    LanguageConfig {
        id: "rust",
        label: "Rust",
        monaco_language: "rust",
        runtime: Runtime {
            language: "rust",
            version: "1.68.2",
        },
        default_code: r#"fn main() {
    let squares: Vec<i32> = (1..=5).map(|n| n * n).collect();
    println!("squares: {:?}", squares);
}
"#,
    },
    LanguageConfig {
        id: "cpp",
        label: "C++",
        monaco_language: "cpp",
        runtime: Runtime {
            language: "cpp",
            version: "10.2.0",
        },
        default_code: r#"#include <iostream>

int main() {
    int total = 0;
    for (int n = 1; n <= 5; ++n) total += n;
    std::cout << "total: " << total << std::endl;
    return 0;
}
"#,
    },
    LanguageConfig {
        id: "csharp",
        label: "C#",
        monaco_language: "csharp",
        runtime: Runtime {
            language: "csharp",
            version: "6.12.0",
        },
        default_code: r#"using System;
using System.Linq;

class Program {
    static void Main() {
        var squares = Enumerable.Range(1, 5).Select(n => n * n);
        Console.WriteLine("squares: " + string.Join(", ", squares));
    }
}
"#,
    },
    LanguageConfig {
        id: "ruby",
        label: "Ruby",
        monaco_language: "ruby",
        runtime: Runtime {
            language: "ruby",
            version: "3.0.1",
        },
        default_code: r#"numbers = [1, 2, 3, 4, 5]
puts "squares: #{numbers.map { |n| n * n }}"
"#,
    },
    LanguageConfig {
        id: "swift",
        label: "Swift",
        monaco_language: "swift",
        runtime: Runtime {
            language: "swift",
            version: "5.3.3",
        },
        default_code: r#"let numbers = [1, 2, 3, 4, 5]
let squares = numbers.map { $0 * $0 }
print("squares: \(squares)")
"#,
    },
];

/// Every language the editor offers, in menu order.
pub fn supported_languages() -> &'static [LanguageConfig] {
    LANGUAGES
}

/// Looks up a language by its tag.
///
/// # Examples
///
/// ```
/// use snipper_core::languages::language_config;
///
/// assert_eq!(language_config("python").map(|l| l.label), Some("Python"));
/// assert!(language_config("cobol").is_none());
/// ```
pub fn language_config(id: &str) -> Option<&'static LanguageConfig> {
    LANGUAGES.iter().find(|lang| lang.id == id)
}

pub fn runtime_for(id: &str) -> Option<&'static Runtime> {
    language_config(id).map(|lang| &lang.runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_language_is_registered() {
        assert!(language_config(DEFAULT_LANGUAGE).is_some());
    }

    #[test]
    fn language_ids_are_unique() {
        let ids: HashSet<_> = supported_languages().iter().map(|l| l.id).collect();
        assert_eq!(ids.len(), supported_languages().len());
    }

    #[test]
    fn runtime_lookup_matches_table() {
        let rt = runtime_for("rust").expect("rust runtime");
        assert_eq!(rt.language, "rust");
        assert_eq!(rt.version, "1.68.2");
        assert!(runtime_for("brainfuck").is_none());
    }

    #[test]
    fn every_language_has_starter_code() {
        assert!(supported_languages()
            .iter()
            .all(|l| !l.default_code.trim().is_empty()));
    }
}
