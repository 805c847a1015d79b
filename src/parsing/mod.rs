//! Condition/value mini-language: a line-tracking tokenizer and a small
//! recursive-descent parser, independent of the main grammar parser.

pub mod condition;
pub mod token;

pub use condition::ConditionParser;
pub use token::{Token, TokenKind, TokenStream, tokenize};
