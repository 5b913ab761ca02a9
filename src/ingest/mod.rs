pub mod importer;
pub mod parser;
pub mod source;
