pub mod global_variables;
pub mod sanitize;
pub mod shapefile;
