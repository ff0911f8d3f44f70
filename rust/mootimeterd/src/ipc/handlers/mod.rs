pub mod answers;
pub mod core;
pub mod instances;
pub mod pages;
pub mod quiz;
pub mod settings;
