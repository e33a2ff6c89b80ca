//! Type discriminators for manifest entries
//!
//! Each discriminator narrows a generic [`crate::manifest::ManifestEntry`]
//! into a typed entry. A different type tag is a cheap negative; a matching
//! tag with a malformed payload is a [`crate::core::ShapeError`].

pub mod container_image_entry;
pub mod file_entry;
pub mod schema;

pub use container_image_entry::{
    CONTAINER_IMAGE_ASSET_TYPE, ContainerImageDestination, ContainerImageManifestEntry,
    ContainerImageSource, as_container_image_entry, is_container_image_entry,
};
pub use file_entry::{
    FILE_ASSET_TYPE, FileDestination, FileManifestEntry, FilePackaging, FileSource,
    as_file_entry, is_file_entry,
};
pub use schema::JsonKind;
