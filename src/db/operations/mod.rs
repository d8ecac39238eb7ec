#![allow(dead_code)]

pub mod amas;

pub use amas::*;
