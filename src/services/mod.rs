pub mod analyzer;
pub mod intake;
pub mod storage;
pub mod storage_lifecycle;
pub mod worker;
