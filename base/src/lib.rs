pub mod base;
pub mod config;
pub mod dex;
pub mod entity;
pub mod error;
pub mod game;
pub mod movetarget;
pub mod pathing;
pub mod terrain;
pub mod traverse;
