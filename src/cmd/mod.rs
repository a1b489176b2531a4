pub mod caption;
pub mod config;
pub mod embed_faces;
