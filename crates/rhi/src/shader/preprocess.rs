use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::ShaderError;

/// `#include`, `#define`, `#ifdef`/`#ifndef`/`#else`/`#endif` over WGSL.
///
/// Request defines are also injected at the top of the output as
/// `const NAME = VALUE;` (an empty value becomes `true`).
pub struct Preprocessor<'a> {
    defines: BTreeMap<String, String>,
    include_paths: Vec<PathBuf>,
    virtual_files: &'a HashMap<String, String>,
}

struct Cond {
    parent_active: bool,
    taken: bool,
    seen_else: bool,
}

impl<'a> Preprocessor<'a> {
    pub fn new(
        defines: &[(String, String)],
        include_paths: Vec<PathBuf>,
        virtual_files: &'a HashMap<String, String>,
    ) -> Self {
        Self { defines: defines.iter().cloned().collect(), include_paths, virtual_files }
    }

    pub fn run(&self, source: &str, origin: &str) -> Result<String, ShaderError> {
        let mut out = String::with_capacity(source.len() + 64 * self.defines.len());
        for (name, value) in &self.defines {
            if is_identifier(name) {
                let value = if value.trim().is_empty() { "true" } else { value.trim() };
                out.push_str(&format!("const {name} = {value};\n"));
            }
        }
        let mut defines = self.defines.clone();
        let mut stack = vec![origin.to_string()];
        self.expand(source, origin, &mut stack, &mut defines, &mut out)?;
        Ok(out)
    }

    fn expand(
        &self,
        source: &str,
        origin: &str,
        stack: &mut Vec<String>,
        defines: &mut BTreeMap<String, String>,
        out: &mut String,
    ) -> Result<(), ShaderError> {
        let err = |line: usize, message: String| ShaderError::Preprocess { file: origin.to_string(), line, message };
        let mut conds: Vec<Cond> = Vec::new();
        let active = |conds: &[Cond]| conds.last().map_or(true, |c| c.parent_active && c.taken);

        for (i, line) in source.lines().enumerate() {
            let lineno = i + 1;
            let trimmed = line.trim_start();
            let Some(directive) = trimmed.strip_prefix('#') else {
                if active(&conds) {
                    out.push_str(line);
                    out.push('\n');
                } else {
                    out.push('\n');
                }
                continue;
            };

            let mut parts = directive.splitn(2, char::is_whitespace);
            let keyword = parts.next().unwrap_or("");
            let arg = parts.next().unwrap_or("").trim();
            match keyword {
                "ifdef" | "ifndef" => {
                    let parent_active = active(&conds);
                    let defined = defines.contains_key(arg);
                    let taken = if keyword == "ifdef" { defined } else { !defined };
                    conds.push(Cond { parent_active, taken, seen_else: false });
                }
                "else" => {
                    let cond = conds.last_mut().ok_or_else(|| err(lineno, "#else without #ifdef".into()))?;
                    if cond.seen_else {
                        return Err(err(lineno, "duplicate #else".into()));
                    }
                    cond.seen_else = true;
                    cond.taken = !cond.taken;
                }
                "endif" => {
                    conds.pop().ok_or_else(|| err(lineno, "#endif without #ifdef".into()))?;
                }
                "define" if active(&conds) => {
                    let mut kv = arg.splitn(2, char::is_whitespace);
                    let name = kv.next().unwrap_or("");
                    if !is_identifier(name) {
                        return Err(err(lineno, format!("bad #define name `{name}`")));
                    }
                    defines.insert(name.to_string(), kv.next().unwrap_or("").trim().to_string());
                }
                "include" if active(&conds) => {
                    let name = arg
                        .strip_prefix('"')
                        .and_then(|a| a.strip_suffix('"'))
                        .ok_or_else(|| err(lineno, format!("malformed #include {arg}")))?;
                    let (key, text) = self.resolve(name, origin).ok_or_else(|| err(lineno, format!("include `{name}` not found")))?;
                    if stack.contains(&key) {
                        return Err(err(lineno, format!("recursive include of `{name}`")));
                    }
                    stack.push(key.clone());
                    self.expand(&text, &key, stack, defines, out)?;
                    stack.pop();
                }
                "define" | "include" => out.push('\n'),
                other => return Err(err(lineno, format!("unknown directive #{other}"))),
            }
        }

        if !conds.is_empty() {
            return Err(err(source.lines().count(), "unterminated #ifdef".into()));
        }
        Ok(())
    }

    /// Embedded sources first, then the including file's directory, then the
    /// include paths.
    fn resolve(&self, name: &str, origin: &str) -> Option<(String, String)> {
        if let Some(text) = self.virtual_files.get(name) {
            return Some((name.to_string(), text.clone()));
        }
        let origin_dir = Path::new(origin).parent().map(Path::to_path_buf);
        origin_dir
            .into_iter()
            .chain(self.include_paths.iter().cloned())
            .map(|dir| dir.join(name))
            .find(|p| p.is_file())
            .and_then(|p| std::fs::read_to_string(&p).ok().map(|text| (p.to_string_lossy().into_owned(), text)))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str, defines: &[(&str, &str)], files: &HashMap<String, String>) -> Result<String, ShaderError> {
        let defines: Vec<_> = defines.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Preprocessor::new(&defines, Vec::new(), files).run(src, "test.wgsl")
    }

    #[test]
    fn defines_become_consts() {
        let out = run("fn f() {}\n", &[("SHADOWS", ""), ("LOD", "2")], &HashMap::new()).unwrap();
        assert!(out.contains("const LOD = 2;"));
        assert!(out.contains("const SHADOWS = true;"));
    }

    #[test]
    fn conditionals_select_branches() {
        let src = "#ifdef FOG\nfog\n#else\nclear\n#endif\n#ifndef FOG\nnofog\n#endif\n";
        let with = run(src, &[("FOG", "1")], &HashMap::new()).unwrap();
        assert!(with.contains("fog\n") && !with.contains("clear") && !with.contains("nofog"));
        let without = run(src, &[], &HashMap::new()).unwrap();
        assert!(without.contains("clear") && without.contains("nofog"));
    }

    #[test]
    fn nested_inactive_blocks_stay_inactive() {
        let src = "#ifdef A\n#ifndef B\ninner\n#endif\n#endif\n";
        assert!(!run(src, &[], &HashMap::new()).unwrap().contains("inner"));
        assert!(run(src, &[("A", "")], &HashMap::new()).unwrap().contains("inner"));
    }

    #[test]
    fn includes_resolve_embedded_files() {
        let mut files = HashMap::new();
        files.insert("common.wgsl".to_string(), "const PI = 3.14;\n".to_string());
        let out = run("#include \"common.wgsl\"\nfn f() {}\n", &[], &files).unwrap();
        assert!(out.contains("const PI = 3.14;"));
    }

    #[test]
    fn recursive_include_is_rejected() {
        let mut files = HashMap::new();
        files.insert("a.wgsl".to_string(), "#include \"b.wgsl\"\n".to_string());
        files.insert("b.wgsl".to_string(), "#include \"a.wgsl\"\n".to_string());
        let e = run("#include \"a.wgsl\"\n", &[], &files).unwrap_err();
        assert!(e.to_string().contains("recursive"), "{e}");
    }

    #[test]
    fn unbalanced_conditionals_fail() {
        assert!(run("#ifdef X\n", &[], &HashMap::new()).is_err());
        assert!(run("#endif\n", &[], &HashMap::new()).is_err());
        assert!(run("#pragma once\n", &[], &HashMap::new()).is_err());
    }
}
