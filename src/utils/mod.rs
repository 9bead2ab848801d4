pub mod feature_flags;
pub mod fs_atomic;
pub mod invocation;
pub mod paths;
pub mod shell;
pub mod table;
pub mod terminal;
pub mod user_paths;
