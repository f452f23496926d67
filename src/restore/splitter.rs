// restoretool/src/restore/splitter.rs
use once_cell::sync::Lazy;
use regex::Regex;

static DEFINER_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" DEFINER=`[^`]+`@`[^`]+`").expect("definer pattern is valid"));

static ALTER_DATABASE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ALTER DATABASE `[a-z0-9_]+`").expect("alter database pattern is valid")
});

/// Stateful tokenizer that turns a raw SQL dump stream into executable
/// statements, one input line at a time. Dumps use interactive-client
/// conventions: `--` comment lines, statements spanning multiple lines, and
/// a statement delimiter that `DELIMITER <token>` directives change
/// mid-stream (needed around trigger and routine bodies).
#[derive(Debug)]
pub struct StatementSplitter {
    buffer: String,
    delimiter: String,
}

impl StatementSplitter {
    pub fn new() -> Self {
        StatementSplitter {
            buffer: String::new(),
            delimiter: ";".to_string(),
        }
    }

    /// Consumes one line of dump text. Returns a completed, sanitized
    /// statement when this line terminates one, `None` while accumulating.
    pub fn push_line(&mut self, raw_line: &str) -> Option<String> {
        let line = raw_line.trim_matches(['\t', '\n', '\r', '\0']);

        // Comment lines are discarded entirely, never joined into a statement.
        if line.starts_with("--") {
            return None;
        }

        // Join continuation lines with exactly one space.
        if !self.buffer.is_empty()
            && !self.buffer.ends_with(' ')
            && !line.is_empty()
            && !line.starts_with(' ')
        {
            self.buffer.push(' ');
        }
        self.buffer.push_str(line);

        // Directives retarget the delimiter and never become statements.
        // Checked before delimiter matching so `DELIMITER ;` is a directive.
        if let Some(token) = self.buffer.strip_prefix("DELIMITER ") {
            if !token.is_empty() {
                self.delimiter = token.to_string();
                self.buffer.clear();
                return None;
            }
        }

        if self.buffer.ends_with(self.delimiter.as_str()) {
            let statement = sanitize_statement(&self.buffer);
            self.buffer.clear();
            return Some(statement);
        }

        None
    }

    /// Unterminated text left in the buffer at end of stream. The engine
    /// discards it (legacy behavior) but logs what it drops.
    pub fn pending(&self) -> Option<&str> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(&self.buffer)
        }
    }

    #[cfg(test)]
    fn delimiter(&self) -> &str {
        &self.delimiter
    }
}

impl Default for StatementSplitter {
    fn default() -> Self {
        StatementSplitter::new()
    }
}

/// Strips the dump-side `DEFINER=`user`@`host`` attribution and drops the
/// explicit name from `ALTER DATABASE `name`` so the statement applies to
/// whatever database the connection is using, not the one baked into the
/// source dump.
fn sanitize_statement(statement: &str) -> String {
    let statement = DEFINER_CLAUSE.replace_all(statement, "");
    ALTER_DATABASE_NAME
        .replace_all(&statement, "ALTER DATABASE")
        .into_owned()
}
