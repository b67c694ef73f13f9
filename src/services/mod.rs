pub mod blob_store;
pub mod gallery_service;
pub mod geocoder;
