//! Built-in format handlers.

pub mod converter;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod text;

pub use converter::ConverterHandler;
#[cfg(feature = "pdf")]
pub use pdf::PdfHandler;
pub use text::TextHandler;
