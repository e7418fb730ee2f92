pub mod notebook_converter;

pub use notebook_converter::{ConversionOutcome, NotebookConverter};
