pub mod actor;
pub mod common;
pub mod icon_engine;
pub mod model;
pub mod sys;
