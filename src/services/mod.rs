//! Domain services: search-result ranking and the filesystem scanner.

pub mod library_scanner;
pub mod ranker;

pub use library_scanner::LibraryScanner;
