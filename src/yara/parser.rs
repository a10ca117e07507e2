//! Parser for the supported YARA subset.
//!
//! ```text
//! rule Name [: tag ...] {
//!     [meta: key = value ...]
//!     strings:
//!         $a = "text" [nocase] [wide] [ascii]
//!         $b = { 4D 5A ?? 00 }
//!     condition:
//!         any of them | all of them | N of them | $a | not $a
//!         | <cond> and <cond> | <cond> or <cond> | ( <cond> )
//! }
//! ```

use super::{Condition, Rule, StringDef, StringValue, YaraError};

struct Cursor<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn line(&self) -> usize {
        self.src[..self.pos.min(self.src.len())]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1
    }

    fn error(&self, message: impl Into<String>) -> YaraError {
        YaraError {
            line: self.line(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.src.len()
    }

    /// Skip whitespace and comments.
    fn skip_ws(&mut self) {
        loop {
            while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
            }
            if self.src[self.pos..].starts_with(b"//") {
                while self.peek().is_some_and(|b| b != b'\n') {
                    self.pos += 1;
                }
            } else if self.src[self.pos..].starts_with(b"/*") {
                match find(&self.src[self.pos + 2..], b"*/") {
                    Some(end) => self.pos += end + 4,
                    None => self.pos = self.src.len(),
                }
            } else {
                return;
            }
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), YaraError> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn word(&mut self) -> Option<&'a str> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        std::str::from_utf8(&self.src[start..self.pos]).ok()
    }

    fn peek_word(&mut self) -> Option<&'a str> {
        let saved = self.pos;
        let word = self.word();
        self.pos = saved;
        word
    }

    fn keyword(&mut self, kw: &str) -> bool {
        let saved = self.pos;
        if self.word() == Some(kw) {
            true
        } else {
            self.pos = saved;
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), YaraError> {
        if self.keyword(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", kw)))
        }
    }

    fn string_id(&mut self) -> Result<String, YaraError> {
        self.expect(b'$')?;
        let name = self.word().unwrap_or_default();
        Ok(format!("${}", name))
    }

    fn quoted(&mut self) -> Result<Vec<u8>, YaraError> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            let b = self.peek().ok_or_else(|| self.error("unterminated string"))?;
            self.pos += 1;
            match b {
                b'"' => return Ok(out),
                b'\n' => return Err(self.error("newline in string")),
                b'\\' => {
                    let esc = self.peek().ok_or_else(|| self.error("unterminated escape"))?;
                    self.pos += 1;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b't' => out.push(b'\t'),
                        b'r' => out.push(b'\r'),
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'x' => {
                            let hex = self
                                .src
                                .get(self.pos..self.pos + 2)
                                .and_then(|h| std::str::from_utf8(h).ok())
                                .and_then(|h| u8::from_str_radix(h, 16).ok())
                                .ok_or_else(|| self.error("invalid \\x escape"))?;
                            self.pos += 2;
                            out.push(hex);
                        }
                        other => {
                            return Err(self.error(format!("unknown escape '\\{}'", other as char)))
                        }
                    }
                }
                other => out.push(other),
            }
        }
    }

    fn hex_block(&mut self) -> Result<Vec<Option<u8>>, YaraError> {
        self.expect(b'{')?;
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                Some(b'?') => {
                    if self.src.get(self.pos + 1) != Some(&b'?') {
                        return Err(self.error("nibble wildcards are not supported"));
                    }
                    self.pos += 2;
                    out.push(None);
                }
                Some(_) => {
                    let byte = self
                        .src
                        .get(self.pos..self.pos + 2)
                        .and_then(|h| std::str::from_utf8(h).ok())
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                        .ok_or_else(|| self.error("invalid hex byte"))?;
                    self.pos += 2;
                    out.push(Some(byte));
                }
                None => return Err(self.error("unterminated hex string")),
            }
        }
        if out.iter().all(Option::is_none) {
            return Err(self.error("hex string needs at least one fixed byte"));
        }
        Ok(out)
    }

    fn number(&mut self) -> Option<usize> {
        self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..self.pos]).ok()?.parse().ok()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    memchr::memmem::find(haystack, needle)
}

/// Parse every rule in `source`.
pub fn parse_rules(source: &str) -> Result<Vec<Rule>, YaraError> {
    let mut cur = Cursor::new(source);
    let mut rules = Vec::new();
    while !cur.at_end() {
        // Modifiers are accepted and ignored
        while matches!(cur.peek_word(), Some("private") | Some("global")) {
            cur.word();
        }
        if cur.keyword("import") || cur.keyword("include") {
            return Err(cur.error("imports and includes are not supported"));
        }
        rules.push(parse_rule(&mut cur)?);
    }
    Ok(rules)
}

fn parse_rule(cur: &mut Cursor<'_>) -> Result<Rule, YaraError> {
    cur.expect_keyword("rule")?;
    let name = cur
        .word()
        .ok_or_else(|| cur.error("expected rule name"))?
        .to_string();

    let mut tags = Vec::new();
    if cur.eat(b':') {
        while let Some(tag) = cur.peek_word() {
            if tag.is_empty() {
                break;
            }
            cur.word();
            tags.push(tag.to_string());
        }
    }
    cur.expect(b'{')?;

    if cur.keyword("meta") {
        cur.expect(b':')?;
        skip_meta(cur)?;
    }

    let mut strings = Vec::new();
    if cur.keyword("strings") {
        cur.expect(b':')?;
        while {
            cur.skip_ws();
            cur.peek() == Some(b'$')
        } {
            strings.push(parse_string_def(cur)?);
        }
    }

    cur.expect_keyword("condition")?;
    cur.expect(b':')?;
    let condition = parse_or(cur)?;
    cur.expect(b'}')?;

    for id in condition.references() {
        if !strings.iter().any(|s: &StringDef| s.id == id) {
            return Err(cur.error(format!("rule {} references undefined string {}", name, id)));
        }
    }
    if strings.is_empty() && condition.uses_them() {
        return Err(cur.error(format!("rule {} has no strings", name)));
    }

    Ok(Rule {
        name,
        tags,
        strings,
        condition,
    })
}

fn skip_meta(cur: &mut Cursor<'_>) -> Result<(), YaraError> {
    while !matches!(cur.peek_word(), Some("strings") | Some("condition")) {
        cur.word().ok_or_else(|| cur.error("expected meta key"))?;
        cur.expect(b'=')?;
        cur.skip_ws();
        match cur.peek() {
            Some(b'"') => {
                cur.quoted()?;
            }
            _ => {
                cur.eat(b'-');
                if cur.word().is_none() {
                    return Err(cur.error("expected meta value"));
                }
            }
        }
    }
    Ok(())
}

fn parse_string_def(cur: &mut Cursor<'_>) -> Result<StringDef, YaraError> {
    let id = cur.string_id()?;
    cur.expect(b'=')?;
    cur.skip_ws();
    let value = match cur.peek() {
        Some(b'"') => {
            let text = cur.quoted()?;
            if text.is_empty() {
                return Err(cur.error(format!("string {} is empty", id)));
            }
            let (mut nocase, mut wide, mut ascii) = (false, false, false);
            loop {
                match cur.peek_word() {
                    Some("nocase") => nocase = true,
                    Some("wide") => wide = true,
                    Some("ascii") => ascii = true,
                    Some("fullword") | Some("private") => {}
                    _ => break,
                }
                cur.word();
            }
            StringValue::Text {
                bytes: text,
                nocase,
                wide,
                ascii: ascii || !wide,
            }
        }
        Some(b'{') => StringValue::Hex(cur.hex_block()?),
        _ => return Err(cur.error(format!("string {} must be a text or hex string", id))),
    };
    Ok(StringDef { id, value })
}

fn parse_or(cur: &mut Cursor<'_>) -> Result<Condition, YaraError> {
    let mut left = parse_and(cur)?;
    while cur.keyword("or") {
        let right = parse_and(cur)?;
        left = Condition::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and(cur: &mut Cursor<'_>) -> Result<Condition, YaraError> {
    let mut left = parse_term(cur)?;
    while cur.keyword("and") {
        let right = parse_term(cur)?;
        left = Condition::And(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_term(cur: &mut Cursor<'_>) -> Result<Condition, YaraError> {
    cur.skip_ws();
    if cur.eat(b'(') {
        let inner = parse_or(cur)?;
        cur.expect(b')')?;
        return Ok(inner);
    }
    if cur.keyword("not") {
        return Ok(Condition::Not(Box::new(parse_term(cur)?)));
    }
    if cur.keyword("true") {
        return Ok(Condition::True);
    }
    if cur.keyword("false") {
        return Ok(Condition::Not(Box::new(Condition::True)));
    }
    if cur.peek() == Some(b'$') {
        return Ok(Condition::Ref(cur.string_id()?));
    }
    if cur.keyword("any") {
        cur.expect_keyword("of")?;
        cur.expect_keyword("them")?;
        return Ok(Condition::AtLeast(1));
    }
    if cur.keyword("all") {
        cur.expect_keyword("of")?;
        cur.expect_keyword("them")?;
        return Ok(Condition::AllOf);
    }
    if let Some(n) = cur.number() {
        cur.expect_keyword("of")?;
        cur.expect_keyword("them")?;
        return Ok(Condition::AtLeast(n));
    }
    Err(cur.error("unsupported condition"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_rule() {
        let src = r#"
            // dropper heuristics
            rule Dropper : trojan win {
                meta:
                    author = "analyst"
                    score = 80
                strings:
                    $mz = { 4D 5A ?? 00 }
                    $url = "http://" nocase
                    $w = "cmd.exe" wide ascii
                condition:
                    $mz and ($url or 2 of them)
            }
        "#;
        let rules = parse_rules(src).unwrap();
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.name, "Dropper");
        assert_eq!(rule.tags, ["trojan", "win"]);
        assert_eq!(rule.strings.len(), 3);
        assert!(matches!(rule.condition, Condition::And(_, _)));
        match &rule.strings[2].value {
            StringValue::Text { wide, ascii, .. } => assert!(*wide && *ascii),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_undefined_reference() {
        let err = parse_rules(r#"rule A { strings: $a = "x" condition: $b }"#).unwrap_err();
        assert!(err.message.contains("$b"));
    }

    #[test]
    fn rejects_unsupported_syntax() {
        assert!(parse_rules(r#"import "pe" rule A { condition: true }"#).is_err());
        assert!(parse_rules(r#"rule A { strings: $a = /re/ condition: $a }"#).is_err());
        assert!(parse_rules(r#"rule A { strings: $a = { ?? ?? } condition: $a }"#).is_err());
        let err = parse_rules("rule A {\n strings:\n $a = \"x\"\n condition: filesize < 10 }").unwrap_err();
        assert_eq!(err.line, 4);
    }

    #[test]
    fn parses_multiple_rules() {
        let src = r#"rule A { strings: $a = "aa" condition: any of them }
                     private rule B { condition: true }"#;
        let rules = parse_rules(src).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].condition, Condition::True);
    }
}
