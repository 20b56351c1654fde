mod lexer;
mod parser;
mod token;

pub use lexer::Lexer;
pub use parser::*;
pub use token::Token;
