pub mod keywords;
pub mod lexer;
pub mod repair;
pub mod similarity;

pub use lexer::{tokenize, LexError, Token, TokenKind};
pub use repair::{Correction, HeuristicRepairer, Repair, DEFAULT_SIMILARITY_THRESHOLD};
pub use similarity::similarity;
