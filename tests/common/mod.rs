#![allow(dead_code)]

pub mod helpers;
