pub mod ast;
pub mod duration;
mod error;
mod generate;
mod names;
pub mod parse_utils;
mod reverse;
mod rule;
mod tick_parser;

pub use error::{GenerateError, ReverseError};
pub use generate::{GeneratorOptions, TickGenerator, generate};
pub use names::HTTP_ENDPOINT;
pub use reverse::reverse;
pub use rule::*;
pub use tick_parser::parse_script;
