mod file_io;
mod local;
mod memory;

pub use file_io::{FileIO, FileMetadata, FileRead, FileWrite, InputFile, OutputFile, Storage};
pub use local::LocalStorage;
pub use memory::MemoryStorage;
