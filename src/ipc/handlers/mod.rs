pub mod backup;
pub mod classes;
pub mod core;
pub mod roster;
pub mod students;
pub mod workbook;
