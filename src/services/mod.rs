pub mod compression;
pub mod gallery;
pub mod photos;
pub mod pipeline;
pub mod storage;
