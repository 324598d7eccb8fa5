use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("No parseable price for product {id}")]
    NoPrice { id: String },
}

pub type ParsingResult<T> = Result<T, ParsingError>;
