use objc2_core_graphics::CGError;

pub mod event;
pub mod geometry;
pub mod screen;
pub mod skylight;
pub mod window_server;

#[allow(non_camel_case_types)]
pub type pid_t = i32;

pub fn cg_ok(err: CGError) -> Result<(), CGError> {
    if err == CGError::Success { Ok(()) } else { Err(err) }
}
