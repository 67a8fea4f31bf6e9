pub mod index;
pub mod layout;

pub use index::{GalleryIndex, GalleryRecord, IndexSource};
pub use layout::{record_timestamp, stamped_file_name, validate_file_name, GalleryLayout};
