//! Split a SQL buffer into individual statements.
//!
//! A character-by-character scanner in the style of the shell's other
//! lexers (never panics, never rejects input): it tracks whether the
//! cursor is inside a single-quoted string, a double-quoted identifier,
//! a line/block comment, or a dollar-quoted body, and only treats `;`
//! as a statement boundary outside all of those.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// Split `sql` on top-level `;`, returning trimmed, non-empty statements
/// in source order.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut current_start = 0usize;
    let mut mode = Mode::Normal;
    let mut dollar_tag: Option<Vec<char>> = None;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match mode {
            Mode::Normal => {
                if let Some(tag) = &dollar_tag {
                    if chars[i..].starts_with(tag.as_slice()) {
                        i += tag.len();
                        dollar_tag = None;
                        continue;
                    }
                    i += 1;
                    continue;
                }
                match c {
                    '\'' => {
                        mode = Mode::SingleQuoted;
                        i += 1;
                    }
                    '"' => {
                        mode = Mode::DoubleQuoted;
                        i += 1;
                    }
                    '-' if chars.get(i + 1) == Some(&'-') => {
                        mode = Mode::LineComment;
                        i += 2;
                    }
                    '/' if chars.get(i + 1) == Some(&'*') => {
                        mode = Mode::BlockComment;
                        i += 2;
                    }
                    '$' => {
                        if let Some(tag) = scan_dollar_tag(&chars, i) {
                            i += tag.len();
                            dollar_tag = Some(tag);
                        } else {
                            i += 1;
                        }
                    }
                    ';' => {
                        let stmt: String = chars[current_start..i].iter().collect();
                        push_trimmed(&mut statements, &stmt);
                        i += 1;
                        current_start = i;
                    }
                    _ => i += 1,
                }
            }
            Mode::SingleQuoted => {
                if c == '\\' && chars.get(i + 1).is_some() {
                    i += 2;
                } else if c == '\'' {
                    mode = Mode::Normal;
                    i += 1;
                } else {
                    i += 1;
                }
            }
            Mode::DoubleQuoted => {
                if c == '\\' && chars.get(i + 1).is_some() {
                    i += 2;
                } else if c == '"' {
                    mode = Mode::Normal;
                    i += 1;
                } else {
                    i += 1;
                }
            }
            Mode::LineComment => {
                if c == '\n' {
                    mode = Mode::Normal;
                }
                i += 1;
            }
            Mode::BlockComment => {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    mode = Mode::Normal;
                    i += 2;
                } else {
                    i += 1;
                }
            }
        }
    }

    if current_start < chars.len() {
        let stmt: String = chars[current_start..].iter().collect();
        push_trimmed(&mut statements, &stmt);
    }

    statements
}

fn push_trimmed(statements: &mut Vec<String>, stmt: &str) {
    let trimmed = stmt.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}

/// At `chars[i] == '$'`, try to scan a dollar-quote opening tag
/// (`$$` or `$tag$`). Returns the tag (including both `$` delimiters)
/// if found.
fn scan_dollar_tag(chars: &[char], i: usize) -> Option<Vec<char>> {
    let mut j = i + 1;
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    if j < chars.len() && chars[j] == '$' {
        Some(chars[i..=j].to_vec())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_statements() {
        let stmts = split_statements("SELECT 1; SELECT 2");
        assert_eq!(stmts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn respects_quoted_semicolons() {
        let stmts = split_statements("INSERT INTO t VALUES ('a;b')");
        assert_eq!(stmts, vec!["INSERT INTO t VALUES ('a;b')"]);
    }

    #[test]
    fn preserves_dollar_quoted_function_body() {
        let sql = "INSERT INTO t VALUES ('a;b'); CREATE FUNCTION f() RETURNS void AS $$ BEGIN END; $$ LANGUAGE plpgsql; SELECT 1";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 3);
        assert!(stmts[1].contains("BEGIN END;"));
        assert_eq!(stmts[2], "SELECT 1");
    }

    #[test]
    fn preserves_tagged_dollar_quote() {
        let sql = "CREATE FUNCTION f() AS $tag$ SELECT 1; $tag$ LANGUAGE sql; SELECT 2";
        let stmts = split_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("SELECT 1;"));
    }

    #[test]
    fn strips_line_and_block_comments_semicolons() {
        let sql = "SELECT 1; -- a ; b\nSELECT 2 /* c ; d */";
        let stmts = split_statements(sql);
        assert_eq!(stmts, vec!["SELECT 1", "-- a ; b\nSELECT 2 /* c ; d */"]);
    }

    #[test]
    fn ignores_empty_trailing_statement() {
        let stmts = split_statements("SELECT 1;");
        assert_eq!(stmts, vec!["SELECT 1"]);
    }
}
