pub mod file;
pub mod message;

pub use file::FileHandle;
pub use message::{create_message, format_time, FileMetadata, Message};
