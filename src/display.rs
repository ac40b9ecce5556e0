//! Preview window abstraction and keyboard mapping.

use image::RgbImage;

/// Key code reported for Escape.
pub const KEY_ESCAPE: i32 = 27;
/// Key code reported for the right arrow.
pub const KEY_RIGHT: i32 = 83;
/// Key code reported for the left arrow.
pub const KEY_LEFT: i32 = 81;
/// GTK keysym for Escape.
pub const KEYSYM_ESCAPE: i32 = 0xFF1B;
/// GTK keysym for the right arrow.
pub const KEYSYM_RIGHT: i32 = 0xFF53;
/// GTK keysym for the left arrow.
pub const KEYSYM_LEFT: i32 = 0xFF51;

/// Keyboard commands understood by the preview loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Leave the preview.
    Quit,
    /// Switch to the next camera.
    Next,
    /// Switch to the previous camera.
    Previous,
}

/// Map a raw key code to a command. Unknown codes and "no key" map to `None`.
#[must_use]
pub const fn key_from_code(code: i32) -> Option<Key> {
    match code {
        KEY_ESCAPE | KEYSYM_ESCAPE => Some(Key::Quit),
        KEY_RIGHT | KEYSYM_RIGHT => Some(Key::Next),
        KEY_LEFT | KEYSYM_LEFT => Some(Key::Previous),
        _ => None,
    }
}

/// Error raised by the display backend.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    /// The window could not be created.
    #[error("failed to create window {title:?}: {reason}")]
    CreateFailed {
        /// Window title.
        title: String,
        /// Backend message.
        reason: String,
    },
    /// Any other backend failure.
    #[error("display backend error: {0}")]
    Backend(String),
}

/// A window that shows preview images and reports key presses.
pub trait PreviewWindow {
    /// Replace the window contents.
    fn show(&mut self, image: &RgbImage) -> Result<(), DisplayError>;

    /// Poll for a single key press without blocking for long.
    fn poll_key(&mut self) -> Result<Option<Key>, DisplayError>;

    /// Tear the window down.
    fn close(&mut self) -> Result<(), DisplayError>;
}
