//! Line repair table used to keep parsing past a syntax error
//!
//! A broken line is replaced in place by a minimal, syntactically complete
//! stand-in so the parser can move on and report the next error.

/// One (keyword, replacement) entry; `keyword` must start the line content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairRule {
    pub keyword: &'static str,
    pub replacement: &'static str,
}

const fn rule(keyword: &'static str, replacement: &'static str) -> RepairRule {
    RepairRule {
        keyword,
        replacement,
    }
}

/// Ordered repair rules, first match wins, with a no-op fallback
#[derive(Debug, Clone)]
pub struct RepairTable {
    rules: Vec<RepairRule>,
    fallback: &'static str,
}

impl RepairTable {
    pub fn new(rules: Vec<RepairRule>, fallback: &'static str) -> Self {
        Self { rules, fallback }
    }

    /// Stand-ins for block-opening statements of indentation-structured scripts
    pub fn block_keywords() -> Self {
        Self::new(
            vec![
                rule("class", "class C():"),
                rule("def", "def f(self):"),
                rule("if", "if True:"),
                rule("else", "else:"),
                rule("elif", "elif True:"),
                rule("try", "try:"),
                rule("except", "except:"),
                rule("finally", "finally:"),
                rule("for", "for i in range(0, 0):"),
                rule("while", "while True:"),
            ],
            "pass",
        )
    }

    pub fn rules(&self) -> &[RepairRule] {
        &self.rules
    }

    /// Repaired form of one line, or `None` when the line is blank
    ///
    /// Leading indentation is kept so the block structure stays intact.
    pub fn repair_line(&self, line: &str) -> Option<String> {
        let content = line.trim_start();
        if content.is_empty() {
            return None;
        }
        let indent = &line[..line.len() - content.len()];

        let replacement = self
            .rules
            .iter()
            .find(|r| starts_with_word(content, r.keyword))
            .map_or(self.fallback, |r| r.replacement);

        Some(format!("{}{}", indent, replacement))
    }

    /// Repair 1-based line `line_no` in place; returns whether the text changed
    pub fn repair(&self, lines: &mut [String], line_no: usize) -> bool {
        let Some(line) = line_no.checked_sub(1).and_then(|i| lines.get_mut(i)) else {
            return false;
        };
        match self.repair_line(line) {
            Some(repaired) if repaired != *line => {
                *line = repaired;
                true
            }
            _ => false,
        }
    }
}

impl Default for RepairTable {
    fn default() -> Self {
        Self::block_keywords()
    }
}

fn starts_with_word(content: &str, keyword: &str) -> bool {
    content.starts_with(keyword)
        && !content[keyword.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
}
