pub mod term_reader;

pub use term_reader::{EntryValue, TermReader};
