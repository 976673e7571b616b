//! Deterministic, offline corrections applied to every candidate before it
//! reaches the read-only policy.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::keywords::is_keyword;
use super::lexer::{tokenize, Token, TokenKind};
use super::similarity::similarity;
use crate::domain::candidate::Candidate;
use crate::domain::schema::KnownIdentifiers;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

const PATTERN_OPERATORS: &[&str] = &["LIKE", "ILIKE", "GLOB"];
const EQUALITY_OPERATORS: &[&str] = &["=", "<>", "!="];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Correction {
    Identifier { from: String, to: String },
    QuotedLiteral { literal: String },
    TrimmedTerminator,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repair {
    pub sql: String,
    pub corrections: Vec<Correction>,
}

impl Repair {
    pub fn changed(&self) -> bool {
        !self.corrections.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum IdentifierScope {
    Tables,
    Columns,
    Any,
}

#[derive(Clone, Debug)]
pub struct HeuristicRepairer {
    similarity_threshold: f64,
}

impl Default for HeuristicRepairer {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl HeuristicRepairer {
    pub fn new(similarity_threshold: f64) -> Self {
        Self { similarity_threshold: similarity_threshold.clamp(0.0, 1.0) }
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// Returns the candidate unchanged when nothing needed fixing, otherwise a
    /// heuristically repaired candidate in the same round.
    pub fn repair_candidate(
        &self,
        candidate: &Candidate,
        known: &KnownIdentifiers,
    ) -> (Candidate, Vec<Correction>) {
        let repair = self.repair(candidate.sql(), known);
        if repair.sql == candidate.sql() {
            return (candidate.clone(), repair.corrections);
        }
        (candidate.heuristically_repaired(repair.sql), repair.corrections)
    }

    pub fn repair(&self, sql: &str, known: &KnownIdentifiers) -> Repair {
        let tokens = tokenize(sql);
        let sig: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| !token.is_trivia())
            .map(|(index, _)| index)
            .collect();
        let aliases = collect_aliases(sql, &tokens, &sig);

        let mut corrections = Vec::new();
        let mut replacements: Vec<(usize, usize, String)> = Vec::new();
        let mut claimed: HashSet<usize> = HashSet::new();

        // unquoted pattern operands
        for (k, &index) in sig.iter().enumerate() {
            let token = &tokens[index];
            if !PATTERN_OPERATORS.iter().any(|op| token.is_word(sql, op)) {
                continue;
            }
            let Some(&operand_start) = sig.get(k + 1) else {
                continue;
            };
            let run = pattern_operand(sql, &tokens, operand_start);
            if run.is_empty() {
                continue;
            }
            let after = next_significant(&tokens, run[run.len() - 1]);
            if run.len() == 1 {
                let only = &tokens[run[0]];
                let text = only.text(sql);
                let qualified_or_call = after.is_some_and(|next| {
                    tokens[next].is_symbol(sql, "(") || tokens[next].is_symbol(sql, ".")
                });
                if only.kind != TokenKind::Word
                    || qualified_or_call
                    || is_keyword(text)
                    || known.contains(text)
                    || aliases.contains(&text.to_lowercase())
                {
                    continue;
                }
            }
            if run.iter().all(|&i| tokens[i].kind == TokenKind::Number) {
                continue;
            }

            let start = tokens[run[0]].start;
            let end = tokens[run[run.len() - 1]].end;
            let literal = sql[start..end].to_string();
            replacements.push((start, end, quote_literal(&literal)));
            corrections.push(Correction::QuotedLiteral { literal });
            claimed.extend(run);
        }

        for (k, &index) in sig.iter().enumerate() {
            let token = &tokens[index];
            if token.kind != TokenKind::Word || claimed.contains(&index) {
                continue;
            }
            let word = token.text(sql);
            let next = sig.get(k + 1).map(|&i| &tokens[i]);
            if is_keyword(word)
                || known.contains(word)
                || aliases.contains(&word.to_lowercase())
                || next.is_some_and(|next| next.is_symbol(sql, "("))
            {
                continue;
            }

            let previous = k.checked_sub(1).map(|p| &tokens[sig[p]]);
            let scope = if previous.is_some_and(|prev| prev.is_word(sql, "FROM") || prev.is_word(sql, "JOIN")) {
                IdentifierScope::Tables
            } else if previous.is_some_and(|prev| prev.is_symbol(sql, ".")) {
                IdentifierScope::Columns
            } else if next.is_some_and(|next| next.is_symbol(sql, ".")) {
                IdentifierScope::Tables
            } else {
                IdentifierScope::Any
            };

            match self.best_match(word, known, scope) {
                Match::Unique(target) => {
                    replacements.push((token.start, token.end, target.clone()));
                    corrections.push(Correction::Identifier { from: word.to_string(), to: target });
                }
                Match::Ambiguous => {}
                Match::None => {
                    let after_equality = previous.is_some_and(|prev| {
                        prev.kind == TokenKind::Symbol
                            && EQUALITY_OPERATORS.contains(&prev.text(sql))
                    });
                    let qualifier = next.is_some_and(|next| next.is_symbol(sql, "."));
                    if after_equality && !qualifier && scope == IdentifierScope::Any {
                        replacements.push((token.start, token.end, quote_literal(word)));
                        corrections.push(Correction::QuotedLiteral { literal: word.to_string() });
                    }
                }
            }
        }

        let mut cut = sql.len();
        let mut trimmed = false;
        for token in tokens.iter().rev() {
            match token.kind {
                TokenKind::Semicolon => {
                    trimmed = true;
                    cut = token.start;
                }
                _ if token.is_trivia() => cut = token.start,
                _ => break,
            }
        }
        if trimmed {
            corrections.push(Correction::TrimmedTerminator);
        } else {
            cut = sql.len();
        }

        replacements.sort_by_key(|(start, _, _)| *start);
        let mut output = String::with_capacity(sql.len() + 8);
        let mut cursor = 0;
        for (start, end, replacement) in replacements {
            if start < cursor || end > cut {
                continue;
            }
            output.push_str(&sql[cursor..start]);
            output.push_str(&replacement);
            cursor = end;
        }
        output.push_str(&sql[cursor..cut]);

        Repair { sql: output, corrections }
    }

    fn best_match(&self, word: &str, known: &KnownIdentifiers, scope: IdentifierScope) -> Match {
        let pool: Vec<&String> = match scope {
            IdentifierScope::Tables => known.tables.iter().collect(),
            IdentifierScope::Columns => known.columns.iter().collect(),
            IdentifierScope::Any => known.tables.iter().chain(known.columns.iter()).collect(),
        };

        let mut best_score = 0.0_f64;
        let mut best: Vec<&String> = Vec::new();
        for identifier in pool {
            let score = similarity(word, identifier);
            if score + f64::EPSILON < best_score {
                continue;
            }
            if (score - best_score).abs() <= f64::EPSILON {
                if !best.iter().any(|existing| existing.eq_ignore_ascii_case(identifier)) {
                    best.push(identifier);
                }
            } else {
                best_score = score;
                best = vec![identifier];
            }
        }

        if best.is_empty() || best_score < self.similarity_threshold {
            Match::None
        } else if best.len() > 1 {
            Match::Ambiguous
        } else {
            Match::Unique(best[0].clone())
        }
    }
}

enum Match {
    Unique(String),
    Ambiguous,
    None,
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn next_significant(tokens: &[Token], after: usize) -> Option<usize> {
    (after + 1..tokens.len()).find(|&i| !tokens[i].is_trivia())
}

/// Contiguous word, number and `%` tokens starting at `start`.
fn pattern_operand(sql: &str, tokens: &[Token], start: usize) -> Vec<usize> {
    let mut run = Vec::new();
    for (index, token) in tokens.iter().enumerate().skip(start) {
        let part_of_run = match token.kind {
            TokenKind::Word | TokenKind::Number => true,
            TokenKind::Symbol => token.text(sql) == "%",
            _ => false,
        };
        if !part_of_run {
            break;
        }
        if token.kind == TokenKind::Word && is_keyword(token.text(sql)) && run.is_empty() {
            break;
        }
        run.push(index);
    }
    run
}

/// Lower-cased names introduced by `AS`, implicit table aliases and CTE names.
fn collect_aliases(sql: &str, tokens: &[Token], sig: &[usize]) -> HashSet<String> {
    let mut aliases = HashSet::new();
    let at = |k: usize| sig.get(k).map(|&i| &tokens[i]);

    for k in 0..sig.len() {
        let token = &tokens[sig[k]];
        if token.is_word(sql, "AS") {
            match at(k + 1) {
                Some(next) if matches!(next.kind, TokenKind::Word | TokenKind::QuotedIdentifier) => {
                    aliases.insert(unquote(next.text(sql)).to_lowercase());
                }
                Some(next) if next.is_symbol(sql, "(") => {
                    if let Some(name) = k.checked_sub(1).and_then(at) {
                        if name.kind == TokenKind::Word {
                            aliases.insert(name.text(sql).to_lowercase());
                        }
                    }
                }
                _ => {}
            }
        } else if token.is_word(sql, "FROM") || token.is_word(sql, "JOIN") {
            let table = at(k + 1);
            let alias = at(k + 2);
            if let (Some(table), Some(alias)) = (table, alias) {
                if table.kind == TokenKind::Word
                    && alias.kind == TokenKind::Word
                    && !is_keyword(alias.text(sql))
                    && !at(k + 3).is_some_and(|t| t.is_symbol(sql, "("))
                {
                    aliases.insert(alias.text(sql).to_lowercase());
                }
            }
        }
    }

    aliases
}

fn unquote(text: &str) -> &str {
    text.trim_matches(|ch| ch == '"' || ch == '`')
}

#[cfg(test)]
mod tests {
    use super::{Correction, HeuristicRepairer};
    use crate::domain::candidate::{Candidate, CandidateSource};
    use crate::domain::schema::KnownIdentifiers;

    fn university() -> KnownIdentifiers {
        KnownIdentifiers::new(
            ["students", "departments", "enrollments", "majors"],
            ["id", "name", "major", "department_id", "student_id", "gpa", "enrolled_on"],
        )
    }

    fn repair(sql: &str) -> String {
        HeuristicRepairer::default().repair(sql, &university()).sql
    }

    #[test]
    fn misspelled_table_is_corrected() {
        let repaired = HeuristicRepairer::default().repair("SELECT * FROM studnets", &university());

        assert_eq!(repaired.sql, "SELECT * FROM students");
        assert_eq!(
            repaired.corrections,
            vec![Correction::Identifier { from: "studnets".into(), to: "students".into() }]
        );
    }

    #[test]
    fn bare_like_operand_is_quoted() {
        assert_eq!(
            repair("SELECT name FROM students WHERE major LIKE CS"),
            "SELECT name FROM students WHERE major LIKE 'CS'"
        );
        assert_eq!(
            repair("SELECT name FROM students WHERE major LIKE %CS%"),
            "SELECT name FROM students WHERE major LIKE '%CS%'"
        );
    }

    #[test]
    fn like_against_column_or_literal_is_left_alone() {
        let sql = "SELECT name FROM students WHERE name LIKE major OR major LIKE 'CS%'";
        assert_eq!(repair(sql), sql);
    }

    #[test]
    fn bare_equality_word_is_quoted_but_columns_are_not() {
        assert_eq!(
            repair("SELECT name FROM students WHERE major = Physics"),
            "SELECT name FROM students WHERE major = 'Physics'"
        );
        let join = "SELECT s.name FROM students s JOIN majors m ON s.major = m.name";
        assert_eq!(repair(join), join);
    }

    #[test]
    fn aliases_ctes_and_functions_are_never_corrected() {
        let sql = "WITH studnt AS (SELECT id FROM students) \
                   SELECT count(*) AS nme, studnt.id FROM studnt JOIN majors mjr ON mjr.id = studnt.id";
        assert_eq!(repair(sql), sql);

        let function = "SELECT nam(name) FROM students";
        assert_eq!(repair(function), function);
    }

    #[test]
    fn qualified_column_typos_use_column_names() {
        assert_eq!(
            repair("SELECT e.enroled_on FROM enrollments e WHERE e.student_id = 7"),
            "SELECT e.enrolled_on FROM enrollments e WHERE e.student_id = 7"
        );
    }

    #[test]
    fn ambiguous_or_distant_matches_are_left_alone() {
        let known = KnownIdentifiers::new(["orders_a", "orders_b"], Vec::<String>::new());
        let repairer = HeuristicRepairer::default();

        assert_eq!(repairer.repair("SELECT * FROM orders_c", &known).sql, "SELECT * FROM orders_c");
        assert_eq!(repairer.repair("SELECT * FROM invoices", &known).sql, "SELECT * FROM invoices");
    }

    #[test]
    fn trailing_terminator_is_removed() {
        let repaired = HeuristicRepairer::default().repair("SELECT id FROM students;  \n", &university());

        assert_eq!(repaired.sql, "SELECT id FROM students");
        assert!(repaired.corrections.contains(&Correction::TrimmedTerminator));
    }

    #[test]
    fn words_inside_string_literals_are_untouched() {
        let sql = "SELECT name FROM students WHERE name = 'studnets; LIKE x'";
        assert_eq!(repair(sql), sql);
    }

    #[test]
    fn repair_is_idempotent() {
        let inputs = [
            "SELECT * FROM studnets",
            "SELECT name FROM studnets WHERE major LIKE %CS% AND majr = Physics;",
            "SELECT s.nmae, count(*) AS total FROM studnets s JOIN enrolments e ON e.student_id = s.id GROUP BY s.nmae",
            "SELECT 'unterminated",
            "DROP TABLE studnets;",
            "SELECT name FROM students WHERE name = O'Brien",
            "",
            ";;",
        ];
        let repairer = HeuristicRepairer::default();
        let known = university();

        for input in inputs {
            let once = repairer.repair(input, &known).sql;
            let twice = repairer.repair(&once, &known).sql;
            assert_eq!(once, twice, "input: {input}");
        }
    }

    #[test]
    fn candidate_wrapper_tracks_provenance() {
        let repairer = HeuristicRepairer::default();
        let known = university();

        let untouched = Candidate::generated("SELECT id FROM students");
        let (same, corrections) = repairer.repair_candidate(&untouched, &known);
        assert_eq!(same, untouched);
        assert!(corrections.is_empty());

        let (fixed, _) = repairer.repair_candidate(&Candidate::generated("SELECT id FROM studnets"), &known);
        assert_eq!(fixed.source(), CandidateSource::HeuristicallyRepaired);
        assert_eq!(fixed.round(), 0);
    }
}
