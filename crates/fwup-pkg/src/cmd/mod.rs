pub mod apps;
pub mod build;
pub mod hash;
pub mod inspect;
