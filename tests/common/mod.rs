#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

pub mod telegram_stub;
