pub(crate) mod rebuild_index;
