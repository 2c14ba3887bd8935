// Common utilities shared by the SDC parser and extractor

pub mod binary;
pub mod path_security;
