//! Read-only policy enforced on every candidate before it may reach a database.

use textsql_core::domain::candidate::Candidate;
use textsql_core::domain::verdict::{Rejection, RejectionReason, ValidationVerdict};
use textsql_core::sql::lexer::{tokenize, Token, TokenKind};

/// Verbs rejected anywhere outside a string literal.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "COMMIT", "ROLLBACK", "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "MERGE",
];

const FRAGMENT_CHARS: usize = 40;

/// A candidate the read-only policy accepted. Only [`ReadOnlyPolicy::vet`]
/// can produce one, so holding it proves the statement was validated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovedCandidate {
    candidate: Candidate,
}

impl ApprovedCandidate {
    pub fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    pub fn sql(&self) -> &str {
        self.candidate.sql()
    }

    pub fn into_inner(self) -> Candidate {
        self.candidate
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow(ApprovedCandidate),
    Deny(Rejection),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadOnlyPolicy {
    pub allow_common_table_expressions: bool,
}

impl Default for ReadOnlyPolicy {
    fn default() -> Self {
        Self { allow_common_table_expressions: true }
    }
}

impl ReadOnlyPolicy {
    pub fn vet(&self, candidate: &Candidate) -> GuardrailDecision {
        match self.validate(candidate.sql()) {
            ValidationVerdict::Accepted => {
                GuardrailDecision::Allow(ApprovedCandidate { candidate: candidate.clone() })
            }
            ValidationVerdict::Rejected(rejection) => GuardrailDecision::Deny(rejection),
        }
    }

    /// Classifies `sql` without executing it. When several rules match, the
    /// highest priority reason is reported.
    pub fn validate(&self, sql: &str) -> ValidationVerdict {
        let tokens = tokenize(sql);
        let mut findings = Vec::new();

        findings.extend(write_keyword(sql, &tokens));
        findings.extend(statement_separator(sql, &tokens));
        findings.extend(injection_pattern(sql, &tokens));
        let unparseable = unparseable(sql, &tokens);
        let is_unparseable = unparseable.is_some();
        findings.extend(unparseable);
        if !is_unparseable {
            findings.extend(self.unsupported_statement(sql, &tokens));
        }

        match findings.into_iter().min_by_key(|finding| finding.reason) {
            Some(rejection) => ValidationVerdict::Rejected(rejection),
            None => ValidationVerdict::Accepted,
        }
    }

    fn unsupported_statement(&self, sql: &str, tokens: &[Token]) -> Option<Rejection> {
        let mut significant =
            tokens.iter().filter(|token| !token.is_trivia() && !token.is_symbol(sql, "("));
        let leading = significant.next()?;

        if leading.is_word(sql, "SELECT") {
            return None;
        }
        if leading.is_word(sql, "WITH") && self.allow_common_table_expressions {
            let selects = tokens.iter().any(|token| token.is_word(sql, "SELECT"));
            if selects {
                return None;
            }
        }
        Some(Rejection::new(RejectionReason::UnsupportedStatement, leading.text(sql)))
    }
}

fn is_blocked(word: &str) -> bool {
    BLOCKED_KEYWORDS.iter().any(|keyword| keyword.eq_ignore_ascii_case(word))
}

/// Words embedded in comment or quoted identifier text.
fn embedded_words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|ch: char| !(ch.is_alphanumeric() || ch == '_')).filter(|word| !word.is_empty())
}

fn write_keyword(sql: &str, tokens: &[Token]) -> Option<Rejection> {
    let significant: Vec<&Token> = tokens.iter().filter(|token| !token.is_trivia()).collect();

    for (position, token) in significant.iter().enumerate() {
        if token.kind != TokenKind::Word {
            continue;
        }
        let word = token.text(sql);
        if is_blocked(word) {
            return Some(Rejection::new(RejectionReason::WriteKeyword, word));
        }
        if word.eq_ignore_ascii_case("REPLACE") {
            let statement_start =
                position == 0 || significant[position - 1].kind == TokenKind::Semicolon;
            let into = significant.get(position + 1).is_some_and(|next| next.is_word(sql, "INTO"));
            if statement_start || into {
                return Some(Rejection::new(RejectionReason::WriteKeyword, word));
            }
        }
    }

    tokens
        .iter()
        .filter(|token| {
            matches!(
                token.kind,
                TokenKind::QuotedIdentifier | TokenKind::LineComment | TokenKind::BlockComment
            )
        })
        .flat_map(|token| embedded_words(token.text(sql)))
        .find(|word| is_blocked(word))
        .map(|word| Rejection::new(RejectionReason::WriteKeyword, word))
}

fn statement_separator(sql: &str, tokens: &[Token]) -> Option<Rejection> {
    let offset = tokens.iter().find_map(|token| match token.kind {
        TokenKind::Semicolon => Some(token.start),
        TokenKind::QuotedIdentifier | TokenKind::LineComment | TokenKind::BlockComment => {
            token.text(sql).find(';').map(|at| token.start + at)
        }
        _ => None,
    })?;

    Some(Rejection::new(RejectionReason::MultipleStatements, excerpt(&sql[offset..])))
}

fn injection_pattern(sql: &str, tokens: &[Token]) -> Option<Rejection> {
    for (index, token) in tokens.iter().enumerate() {
        if token.kind == TokenKind::BlockComment {
            let text = token.text(sql);
            if !token.terminated {
                return Some(Rejection::new(RejectionReason::InjectionPattern, excerpt(text)));
            }
            if text.starts_with("/*!") || text.starts_with("/*+") {
                return Some(Rejection::new(RejectionReason::InjectionPattern, excerpt(text)));
            }

            let glued = |other: Option<&Token>| {
                other.is_some_and(|other| matches!(other.kind, TokenKind::Word | TokenKind::Number))
            };
            let before = index.checked_sub(1).and_then(|i| tokens.get(i));
            let after = tokens.get(index + 1);
            if glued(before) && glued(after) {
                let (start, end) = match (before, after) {
                    (Some(before), Some(after)) => (before.start, after.end),
                    _ => (token.start, token.end),
                };
                return Some(Rejection::new(RejectionReason::InjectionPattern, excerpt(&sql[start..end])));
            }
        }

        if token.kind != TokenKind::StringLiteral && token.text(sql).contains('\0') {
            return Some(Rejection::new(RejectionReason::InjectionPattern, "\\0"));
        }
    }
    None
}

fn unparseable(sql: &str, tokens: &[Token]) -> Option<Rejection> {
    if tokens.iter().all(Token::is_trivia) {
        return Some(Rejection::new(RejectionReason::EmptyOrUnparseable, ""));
    }

    if let Some(open) = tokens.iter().find(|token| {
        !token.terminated && matches!(token.kind, TokenKind::StringLiteral | TokenKind::QuotedIdentifier)
    }) {
        return Some(Rejection::new(RejectionReason::EmptyOrUnparseable, excerpt(open.text(sql))));
    }

    let mut depth: i64 = 0;
    for token in tokens {
        if token.is_symbol(sql, "(") {
            depth += 1;
        } else if token.is_symbol(sql, ")") {
            depth -= 1;
            if depth < 0 {
                return Some(Rejection::new(RejectionReason::EmptyOrUnparseable, ")"));
            }
        }
    }
    if depth > 0 {
        return Some(Rejection::new(RejectionReason::EmptyOrUnparseable, "("));
    }

    None
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= FRAGMENT_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(FRAGMENT_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use textsql_core::domain::candidate::Candidate;
    use textsql_core::domain::verdict::{RejectionReason, ValidationVerdict};

    use super::{GuardrailDecision, ReadOnlyPolicy, BLOCKED_KEYWORDS};

    fn reason(sql: &str) -> Option<RejectionReason> {
        ReadOnlyPolicy::default().validate(sql).rejection().map(|rejection| rejection.reason)
    }

    #[test]
    fn plain_selects_and_ctes_are_accepted() {
        let accepted = [
            "SELECT d.name, COUNT(*) FROM students s JOIN departments d ON d.id = s.department_id GROUP BY d.name",
            "WITH ranked AS (SELECT name, gpa FROM students) SELECT * FROM ranked",
            "(SELECT 1) UNION (SELECT 2)",
            "SELECT replace(name, 'a', 'b') FROM students",
            "SELECT name FROM students WHERE major = 'x' OR replace(name, 'a', 'b') = 'c'",
            "SELECT updated_at, created_by FROM audit",
            "SELECT 'DROP TABLE students; --' AS prank",
        ];
        for sql in accepted {
            assert_eq!(ReadOnlyPolicy::default().validate(sql), ValidationVerdict::Accepted, "{sql}");
        }
    }

    #[test]
    fn every_blocked_keyword_is_rejected() {
        for keyword in BLOCKED_KEYWORDS {
            let sql = format!("SELECT * FROM students WHERE {} IS NULL", keyword.to_lowercase());
            assert_eq!(reason(&sql), Some(RejectionReason::WriteKeyword), "{sql}");
        }
        assert_eq!(reason("REPLACE INTO students VALUES (1)"), Some(RejectionReason::WriteKeyword));
        assert_eq!(
            reason("INSERT OR REPLACE INTO students VALUES (1)"),
            Some(RejectionReason::WriteKeyword)
        );
    }

    #[test]
    fn drop_table_is_a_write_keyword_even_with_separator() {
        let verdict = ReadOnlyPolicy::default().validate("DROP TABLE students;");
        let rejection = verdict.rejection().expect("rejected");

        assert_eq!(rejection.reason, RejectionReason::WriteKeyword);
        assert_eq!(rejection.fragment, "DROP");
    }

    #[test]
    fn separators_outside_literals_are_multiple_statements() {
        assert_eq!(reason("SELECT 1; SELECT 2"), Some(RejectionReason::MultipleStatements));
        assert_eq!(reason("SELECT 1;"), Some(RejectionReason::MultipleStatements));
        assert_eq!(reason("SELECT 1 -- ; trailing"), Some(RejectionReason::MultipleStatements));
        assert_eq!(reason("SELECT ';' AS separator"), None);
    }

    #[test]
    fn keywords_hidden_in_comments_or_identifiers_are_rejected() {
        assert_eq!(reason("SELECT 1 /* delete */"), Some(RejectionReason::WriteKeyword));
        assert_eq!(reason("SELECT \"drop\" FROM t"), Some(RejectionReason::WriteKeyword));
    }

    #[test]
    fn comment_injection_patterns_are_rejected() {
        assert_eq!(reason("SELECT 1 /* never closed"), Some(RejectionReason::InjectionPattern));
        assert_eq!(reason("SELECT /*!50000 1 */"), Some(RejectionReason::InjectionPattern));
        assert_eq!(reason("SE/**/LECT 1"), Some(RejectionReason::InjectionPattern));
        assert_eq!(reason("SELECT 1\0"), Some(RejectionReason::InjectionPattern));
        assert_eq!(reason("SELECT 1 /* fine */ FROM t"), None);
    }

    #[test]
    fn empty_and_unbalanced_input_is_unparseable() {
        assert_eq!(reason(""), Some(RejectionReason::EmptyOrUnparseable));
        assert_eq!(reason("   -- only a comment"), Some(RejectionReason::EmptyOrUnparseable));
        assert_eq!(reason("SELECT 'open"), Some(RejectionReason::EmptyOrUnparseable));
        assert_eq!(reason("SELECT (1"), Some(RejectionReason::EmptyOrUnparseable));
    }

    #[test]
    fn non_select_statements_are_unsupported() {
        assert_eq!(reason("EXPLAIN SELECT 1"), Some(RejectionReason::UnsupportedStatement));
        assert_eq!(reason("VALUES (1)"), Some(RejectionReason::UnsupportedStatement));
        assert_eq!(reason("WITH x AS (VALUES (1)) VALUES (2)"), Some(RejectionReason::UnsupportedStatement));

        let strict = ReadOnlyPolicy { allow_common_table_expressions: false };
        assert!(!strict.validate("WITH x AS (SELECT 1) SELECT * FROM x").is_accepted());
    }

    #[test]
    fn priority_order_is_deterministic() {
        assert_eq!(reason("DELETE FROM t; SELECT 1 /* open"), Some(RejectionReason::WriteKeyword));
        assert_eq!(reason("SELECT 1; SELECT 2 /* open"), Some(RejectionReason::MultipleStatements));
        assert_eq!(reason("SELECT 'open /*!"), Some(RejectionReason::EmptyOrUnparseable));
        assert_eq!(reason("SHOW /*+ hint */ tables"), Some(RejectionReason::InjectionPattern));
    }

    #[test]
    fn vet_only_approves_accepted_candidates() {
        let policy = ReadOnlyPolicy::default();

        match policy.vet(&Candidate::generated("SELECT id FROM students")) {
            GuardrailDecision::Allow(approved) => assert_eq!(approved.sql(), "SELECT id FROM students"),
            GuardrailDecision::Deny(rejection) => panic!("unexpected rejection: {rejection:?}"),
        }
        assert!(matches!(
            policy.vet(&Candidate::generated("DROP TABLE students")),
            GuardrailDecision::Deny(_)
        ));
    }

    #[test]
    fn accepted_statements_contain_no_write_keywords_outside_literals() {
        let corpus = [
            "SELECT name FROM students WHERE note = 'please DROP me'",
            "SELECT \"update\" FROM t",
            "SELECT insert_date FROM t",
            "SELECT 1 -- insert",
            "WITH del AS (SELECT 1) SELECT * FROM del",
            "SELECT deleted FROM t",
        ];
        let policy = ReadOnlyPolicy::default();

        for sql in corpus {
            if !policy.validate(sql).is_accepted() {
                continue;
            }
            let outside_literals: String = sql.split('\'').step_by(2).collect::<Vec<_>>().join(" ");
            let words: Vec<String> = outside_literals
                .split(|ch: char| !(ch.is_alphanumeric() || ch == '_'))
                .map(str::to_ascii_uppercase)
                .collect();
            for keyword in BLOCKED_KEYWORDS {
                assert!(!words.iter().any(|word| word == keyword), "{sql} leaked {keyword}");
            }
        }
    }
}
