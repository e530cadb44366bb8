pub mod export;
pub mod status;
pub mod toc;
