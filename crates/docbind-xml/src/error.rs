//! Error types for reading and writing bound XML.

use docbind_model::{ContentCreationError, ElementError, ParseError, QName};
use std::fmt;

/// Result type alias for docbind-xml operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing or generating XML.
#[derive(Debug, Clone)]
pub enum Error {
    /// XML syntax error from quick-xml.
    XmlSyntax {
        message: String,
        /// Byte offset where the error occurred.
        position: Option<u64>,
    },

    /// Unexpected end of input.
    UnexpectedEof {
        /// What was expected when EOF was encountered.
        expected: String,
    },

    /// A prefix used without a namespace declaration in scope.
    UnknownPrefix { prefix: String },

    /// Empty document (no root element).
    EmptyDocument,

    /// Multiple root elements.
    MultipleRoots,

    /// The root element is not the one the metadata describes.
    UnexpectedRoot { expected: QName, found: QName },

    /// A value or child the bound metadata rejected.
    Parse(ParseError),

    /// A mutation the element tree rejected.
    Element(ElementError),

    /// No way to construct the element type a declaration names.
    Creation(ContentCreationError),

    /// The output sink failed.
    Write { message: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::XmlSyntax { message, position } => {
                write!(f, "XML syntax error: {}", message)?;
                if let Some(pos) = position {
                    write!(f, " at byte {}", pos)?;
                }
                Ok(())
            }
            Error::UnexpectedEof { expected } => {
                write!(f, "Unexpected end of input, expected {}", expected)
            }
            Error::UnknownPrefix { prefix } => {
                write!(f, "Undeclared namespace prefix '{}'", prefix)
            }
            Error::EmptyDocument => {
                write!(f, "Empty XML document: no root element found")
            }
            Error::MultipleRoots => {
                write!(f, "Invalid XML: multiple root elements")
            }
            Error::UnexpectedRoot { expected, found } => {
                write!(f, "Unexpected root element <{}>, expected <{}>", found, expected)
            }
            Error::Parse(err) => write!(f, "Invalid content: {}", err),
            Error::Element(err) => write!(f, "Invalid content: {}", err),
            Error::Creation(err) => write!(f, "Cannot create element: {}", err),
            Error::Write { message } => write!(f, "XML write error: {}", message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parse(err) => Some(err),
            Error::Element(err) => Some(err),
            Error::Creation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlSyntax {
            message: err.to_string(),
            position: None,
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::XmlSyntax {
            message: format!("Attribute error: {}", err),
            position: None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Write {
            message: err.to_string(),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

impl From<ElementError> for Error {
    fn from(err: ElementError) -> Self {
        Error::Element(err)
    }
}

impl From<ContentCreationError> for Error {
    fn from(err: ContentCreationError) -> Self {
        Error::Creation(err)
    }
}
