pub mod parser;

pub use parser::{ExtractionError, PlainTextExtractor, TextExtractor};
