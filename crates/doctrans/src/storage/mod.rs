mod filesystem;

pub(crate) use filesystem::write_atomic;
pub use filesystem::{remove_dir_best_effort, remove_file_if_exists, FileStorage};
