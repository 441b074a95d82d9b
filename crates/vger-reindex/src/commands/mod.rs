pub mod rebuild_index;
pub mod util;
