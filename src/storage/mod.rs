//! AWS access: request signing and the S3 object store.

pub mod s3;
pub mod sigv4;

pub use s3::S3Client;
