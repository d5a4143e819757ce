pub mod commit_point;
pub mod file_lock;
pub mod layout;
pub mod recovery;
pub mod segment;
pub mod segment_reader;
pub mod segment_writer;
