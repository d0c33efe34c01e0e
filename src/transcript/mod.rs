/// Annotated transcript construction and chunking
pub mod chunker;
pub mod formatter;

pub use chunker::chunk_transcript;
pub use crate::ranges::SpanEnd;
pub use formatter::{annotate, format_transcript, AnnotatedSpan};
