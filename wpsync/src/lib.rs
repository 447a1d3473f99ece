pub mod context;
pub mod run;
