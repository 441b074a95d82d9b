pub mod blob_id;
pub mod error;
pub mod index_id;
pub mod pack_id;
