pub mod analyzer;
pub mod storage;
