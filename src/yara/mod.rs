//! Literal-string YARA subset compiled to Aho-Corasick automata.
//!
//! Each string (and each wide/ascii variant) contributes its longest run of
//! fixed bytes as an atom. Atom hits are verified against the full pattern,
//! wildcards included, before a string counts as matched.

mod parser;

pub use parser::parse_rules;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Matches recorded per string
const MAX_OFFSETS_PER_STRING: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct YaraError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringValue {
    Text {
        bytes: Vec<u8>,
        nocase: bool,
        wide: bool,
        ascii: bool,
    },
    /// Hex bytes; `None` is a `??` wildcard
    Hex(Vec<Option<u8>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringDef {
    pub id: String,
    pub value: StringValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    True,
    /// At least N strings matched (`any of them` is N = 1)
    AtLeast(usize),
    AllOf,
    Ref(String),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    /// String identifiers referenced explicitly.
    pub fn references(&self) -> Vec<String> {
        match self {
            Condition::Ref(id) => vec![id.clone()],
            Condition::Not(inner) => inner.references(),
            Condition::And(a, b) | Condition::Or(a, b) => {
                let mut refs = a.references();
                refs.extend(b.references());
                refs
            }
            _ => Vec::new(),
        }
    }

    /// Whether the condition quantifies over `them`.
    pub fn uses_them(&self) -> bool {
        match self {
            Condition::AtLeast(_) | Condition::AllOf => true,
            Condition::Not(inner) => inner.uses_them(),
            Condition::And(a, b) | Condition::Or(a, b) => a.uses_them() || b.uses_them(),
            _ => false,
        }
    }

    fn eval(&self, rule: &Rule, matched: &HashSet<&str>) -> bool {
        match self {
            Condition::True => true,
            Condition::AtLeast(n) => matched.len() >= *n,
            Condition::AllOf => rule.strings.iter().all(|s| matched.contains(s.id.as_str())),
            Condition::Ref(id) => matched.contains(id.as_str()),
            Condition::Not(inner) => !inner.eval(rule, matched),
            Condition::And(a, b) => a.eval(rule, matched) && b.eval(rule, matched),
            Condition::Or(a, b) => a.eval(rule, matched) || b.eval(rule, matched),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub tags: Vec<String>,
    pub strings: Vec<StringDef>,
    pub condition: Condition,
}

/// One matched string of a matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringMatch {
    pub identifier: String,
    pub offsets: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleMatch {
    pub rule: String,
    pub tags: Vec<String>,
    pub strings: Vec<StringMatch>,
}

/// A concrete byte pattern derived from one string definition.
#[derive(Debug)]
struct Pattern {
    rule: usize,
    string: usize,
    bytes: Vec<Option<u8>>,
    nocase: bool,
    atom_offset: usize,
}

impl Pattern {
    fn matches_at(&self, data: &[u8], start: usize) -> bool {
        let Some(window) = data.get(start..start + self.bytes.len()) else {
            return false;
        };
        self.bytes.iter().zip(window).all(|(p, &b)| match p {
            None => true,
            Some(p) if self.nocase => p.eq_ignore_ascii_case(&b),
            Some(p) => *p == b,
        })
    }
}

fn longest_fixed_run(bytes: &[Option<u8>]) -> (usize, usize) {
    let (mut best_start, mut best_len) = (0, 0);
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_none() {
            start = i + 1;
        } else if i + 1 - start > best_len {
            best_start = start;
            best_len = i + 1 - start;
        }
    }
    (best_start, best_len)
}

fn variants(value: &StringValue) -> Vec<(Vec<Option<u8>>, bool)> {
    match value {
        StringValue::Hex(bytes) => vec![(bytes.clone(), false)],
        StringValue::Text {
            bytes,
            nocase,
            wide,
            ascii,
        } => {
            let mut out = Vec::new();
            if *ascii {
                out.push((bytes.iter().map(|&b| Some(b)).collect(), *nocase));
            }
            if *wide {
                out.push((bytes.iter().flat_map(|&b| [Some(b), Some(0)]).collect(), *nocase));
            }
            out
        }
    }
}

/// Compiled rules ready for scanning.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
    patterns: Vec<Pattern>,
    exact: Option<(AhoCorasick, Vec<usize>)>,
    folded: Option<(AhoCorasick, Vec<usize>)>,
}

impl RuleSet {
    /// Parse and compile rule sources.
    pub fn compile<S: AsRef<str>>(sources: &[S]) -> Result<Self, YaraError> {
        let mut rules = Vec::new();
        for source in sources {
            rules.extend(parse_rules(source.as_ref())?);
        }

        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(YaraError {
                    line: 0,
                    message: format!("duplicate rule name {}", rule.name),
                });
            }
        }

        let mut patterns = Vec::new();
        for (r, rule) in rules.iter().enumerate() {
            for (s, def) in rule.strings.iter().enumerate() {
                for (bytes, nocase) in variants(&def.value) {
                    let (atom_offset, _) = longest_fixed_run(&bytes);
                    patterns.push(Pattern {
                        rule: r,
                        string: s,
                        bytes,
                        nocase,
                        atom_offset,
                    });
                }
            }
        }

        let exact = build_automaton(&patterns, false)?;
        let folded = build_automaton(&patterns, true)?;
        Ok(Self {
            rules,
            patterns,
            exact,
            folded,
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules whose condition holds for `data`, in declaration order.
    pub fn scan(&self, data: &[u8]) -> Vec<RuleMatch> {
        // hits[rule][string] holds verified match offsets
        let mut hits: Vec<Vec<Vec<usize>>> = self
            .rules
            .iter()
            .map(|r| vec![Vec::new(); r.strings.len()])
            .collect();

        for (automaton, index) in [&self.exact, &self.folded].into_iter().flatten() {
            for m in automaton.find_overlapping_iter(data) {
                let pattern = &self.patterns[index[m.pattern().as_usize()]];
                let Some(start) = m.start().checked_sub(pattern.atom_offset) else {
                    continue;
                };
                if pattern.matches_at(data, start) {
                    let offsets = &mut hits[pattern.rule][pattern.string];
                    if offsets.len() < MAX_OFFSETS_PER_STRING && !offsets.contains(&start) {
                        offsets.push(start);
                    }
                }
            }
        }

        self.rules
            .iter()
            .zip(hits)
            .filter_map(|(rule, per_string)| {
                let matched: HashSet<&str> = rule
                    .strings
                    .iter()
                    .zip(&per_string)
                    .filter(|(_, offsets)| !offsets.is_empty())
                    .map(|(def, _)| def.id.as_str())
                    .collect();
                if !rule.condition.eval(rule, &matched) {
                    return None;
                }
                let strings = rule
                    .strings
                    .iter()
                    .zip(per_string)
                    .filter(|(_, offsets)| !offsets.is_empty())
                    .map(|(def, mut offsets)| {
                        offsets.sort_unstable();
                        StringMatch {
                            identifier: def.id.clone(),
                            offsets,
                        }
                    })
                    .collect();
                Some(RuleMatch {
                    rule: rule.name.clone(),
                    tags: rule.tags.clone(),
                    strings,
                })
            })
            .collect()
    }
}

fn build_automaton(patterns: &[Pattern], nocase: bool) -> Result<Option<(AhoCorasick, Vec<usize>)>, YaraError> {
    let mut atoms = Vec::new();
    let mut index = Vec::new();
    for (i, p) in patterns.iter().enumerate().filter(|(_, p)| p.nocase == nocase) {
        let (start, len) = longest_fixed_run(&p.bytes);
        let atom: Vec<u8> = p.bytes[start..start + len].iter().flatten().copied().collect();
        atoms.push(atom);
        index.push(i);
    }
    if atoms.is_empty() {
        return Ok(None);
    }
    let automaton = AhoCorasickBuilder::new()
        .ascii_case_insensitive(nocase)
        .build(&atoms)
        .map_err(|e| YaraError {
            line: 0,
            message: format!("cannot build automaton: {}", e),
        })?;
    Ok(Some((automaton, index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(src: &str) -> RuleSet {
        RuleSet::compile(&[src]).unwrap()
    }

    #[test]
    fn any_and_all_of_them() {
        let set = compile(
            r#"
            rule AnyRule { strings: $a = "evil" $b = "good" condition: any of them }
            rule AllRule { strings: $a = "evil" $b = "good" condition: all of them }
            "#,
        );
        let hits = set.scan(b"this is evil stuff");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rule, "AnyRule");
        assert_eq!(hits[0].strings[0].offsets, vec![8]);

        let hits = set.scan(b"evil and good");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn hex_wildcards_verified() {
        let set = compile(r#"rule MZ { strings: $mz = { 4D 5A ?? 00 } condition: $mz }"#);
        assert_eq!(set.scan(b"\x00MZ\x90\x00rest").len(), 1);
        assert!(set.scan(b"MZ\x90\x01").is_empty());
        assert!(set.scan(b"MZ").is_empty());
    }

    #[test]
    fn nocase_and_wide() {
        let set = compile(
            r#"rule Cmd { strings: $c = "cmd.exe" nocase wide condition: $c }
               rule Plain { strings: $p = "Powershell" condition: $p }"#,
        );
        let wide: Vec<u8> = "CMD.EXE".bytes().flat_map(|b| [b, 0]).collect();
        let hits = set.scan(&wide);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].rule, "Cmd");
        // wide-only: ascii form does not match
        assert!(set.scan(b"cmd.exe").is_empty());
        assert!(set.scan(b"powershell").is_empty());
    }

    #[test]
    fn boolean_conditions() {
        let set = compile(
            r#"rule Combo { strings: $a = "alpha" $b = "beta" $c = "gamma"
                 condition: ($a and $b) or (2 of them and not $a) }"#,
        );
        assert_eq!(set.scan(b"alpha beta").len(), 1);
        assert_eq!(set.scan(b"beta gamma").len(), 1);
        assert!(set.scan(b"alpha gamma").is_empty());
    }

    #[test]
    fn duplicate_rule_names_rejected() {
        let err = RuleSet::compile(&[
            r#"rule A { condition: true }"#,
            r#"rule A { condition: true }"#,
        ])
        .unwrap_err();
        assert!(err.message.contains("duplicate"));
    }
}
