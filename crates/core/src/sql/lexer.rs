//! String-literal aware SQL tokenizer.
//!
//! The lexer never fails: unterminated literals, quoted identifiers and block
//! comments are returned as tokens running to the end of input with
//! `terminated == false`, so callers can decide how strict to be.

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    /// `"name"` or `` `name` ``.
    QuotedIdentifier,
    StringLiteral,
    Number,
    Symbol,
    Semicolon,
    LineComment,
    BlockComment,
    Whitespace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offsets into the source text.
    pub start: usize,
    pub end: usize,
    pub terminated: bool,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment)
    }

    pub fn is_word(&self, source: &str, word: &str) -> bool {
        self.kind == TokenKind::Word && self.text(source).eq_ignore_ascii_case(word)
    }

    pub fn is_symbol(&self, source: &str, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text(source) == symbol
    }

    pub fn lex_error(&self) -> Option<LexError> {
        if self.terminated {
            return None;
        }
        match self.kind {
            TokenKind::StringLiteral => Some(LexError::UnterminatedString { offset: self.start }),
            TokenKind::QuotedIdentifier => Some(LexError::UnterminatedIdentifier { offset: self.start }),
            TokenKind::BlockComment => Some(LexError::UnterminatedComment { offset: self.start }),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated string literal starting at byte {offset}")]
    UnterminatedString { offset: usize },
    #[error("unterminated quoted identifier starting at byte {offset}")]
    UnterminatedIdentifier { offset: usize },
    #[error("unterminated block comment starting at byte {offset}")]
    UnterminatedComment { offset: usize },
}

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '!', '|', ':', '&', '~', '^'];

fn is_word_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_word_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

pub fn tokenize(source: &str) -> Vec<Token> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let len = source.len();
    let offset_at = |index: usize| chars.get(index).map(|(offset, _)| *offset).unwrap_or(len);

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (start, ch) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let mut terminated = true;

        let (kind, consumed) = if ch.is_whitespace() {
            let mut j = i + 1;
            while j < chars.len() && chars[j].1.is_whitespace() {
                j += 1;
            }
            (TokenKind::Whitespace, j)
        } else if ch == '-' && next == Some('-') {
            let mut j = i + 2;
            while j < chars.len() && chars[j].1 != '\n' {
                j += 1;
            }
            (TokenKind::LineComment, j)
        } else if ch == '/' && next == Some('*') {
            let mut j = i + 2;
            terminated = false;
            while j < chars.len() {
                if chars[j].1 == '*' && chars.get(j + 1).map(|(_, c)| *c) == Some('/') {
                    j += 2;
                    terminated = true;
                    break;
                }
                j += 1;
            }
            (TokenKind::BlockComment, j)
        } else if ch == '\'' || ch == '"' || ch == '`' {
            let mut j = i + 1;
            terminated = false;
            while j < chars.len() {
                if chars[j].1 == ch {
                    // doubled quote is an escaped quote
                    if chars.get(j + 1).map(|(_, c)| *c) == Some(ch) {
                        j += 2;
                        continue;
                    }
                    j += 1;
                    terminated = true;
                    break;
                }
                j += 1;
            }
            let kind = if ch == '\'' { TokenKind::StringLiteral } else { TokenKind::QuotedIdentifier };
            (kind, j)
        } else if is_word_start(ch) {
            let mut j = i + 1;
            while j < chars.len() && is_word_continue(chars[j].1) {
                j += 1;
            }
            (TokenKind::Word, j)
        } else if ch.is_ascii_digit() {
            let mut j = i + 1;
            while j < chars.len() && (chars[j].1.is_alphanumeric() || chars[j].1 == '.') {
                j += 1;
            }
            (TokenKind::Number, j)
        } else if ch == ';' {
            (TokenKind::Semicolon, i + 1)
        } else if OPERATOR_CHARS.contains(&ch) {
            let mut j = i + 1;
            while j < chars.len() && OPERATOR_CHARS.contains(&chars[j].1) {
                j += 1;
            }
            (TokenKind::Symbol, j)
        } else {
            (TokenKind::Symbol, i + 1)
        };

        tokens.push(Token { kind, start, end: offset_at(consumed), terminated });
        i = consumed;
    }

    tokens
}

/// Tokens with whitespace and comments removed.
pub fn significant(tokens: &[Token]) -> Vec<Token> {
    tokens.iter().filter(|token| !token.is_trivia()).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::{tokenize, LexError, TokenKind};

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .into_iter()
            .filter(|token| token.kind != TokenKind::Whitespace)
            .map(|token| (token.kind, token.text(source).to_string()))
            .collect()
    }

    #[test]
    fn keywords_inside_literals_stay_in_the_literal() {
        let tokens = kinds("SELECT 'it''s; DROP' AS note");

        assert_eq!(tokens[1], (TokenKind::StringLiteral, "'it''s; DROP'".to_string()));
        assert!(!tokens.iter().any(|(kind, _)| *kind == TokenKind::Semicolon));
    }

    #[test]
    fn comments_and_operators_are_split() {
        let tokens = kinds("a<>b -- trailing\n/* block */c");

        assert_eq!(tokens[1], (TokenKind::Symbol, "<>".to_string()));
        assert_eq!(tokens[3].0, TokenKind::LineComment);
        assert_eq!(tokens[4], (TokenKind::BlockComment, "/* block */".to_string()));
        assert_eq!(tokens[5], (TokenKind::Word, "c".to_string()));
    }

    #[test]
    fn unterminated_tokens_report_lex_errors() {
        let source = "SELECT 'open";
        let tokens = tokenize(source);
        let last = tokens.last().expect("token");

        assert_eq!(last.kind, TokenKind::StringLiteral);
        assert_eq!(last.lex_error(), Some(LexError::UnterminatedString { offset: 7 }));

        let comment = tokenize("SELECT 1 /* open");
        assert_eq!(
            comment.last().and_then(|token| token.lex_error()),
            Some(LexError::UnterminatedComment { offset: 9 })
        );
    }

    #[test]
    fn quoted_identifiers_and_numbers() {
        let tokens = kinds("SELECT \"Order\", `x`, 3.14 FROM t");

        assert_eq!(tokens[1], (TokenKind::QuotedIdentifier, "\"Order\"".to_string()));
        assert_eq!(tokens[3], (TokenKind::QuotedIdentifier, "`x`".to_string()));
        assert_eq!(tokens[5], (TokenKind::Number, "3.14".to_string()));
    }
}
