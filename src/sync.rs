pub mod controller;
pub mod selector;
