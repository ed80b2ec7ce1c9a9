pub mod array_build;
pub mod case_map;
