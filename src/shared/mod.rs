pub mod config;
pub mod hash;
pub mod storage_header;
