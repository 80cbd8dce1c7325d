pub mod cloud;
pub mod local;
