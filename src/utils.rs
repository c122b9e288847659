//! Helper functions to deal with serial ports and flash image files.

mod image;
mod keyboard;
mod ports;

pub(crate) use image::{load_image, save_image};
pub(crate) use keyboard::*;
pub(crate) use ports::{open_and_setup_port, select_port, wait_for_port};
