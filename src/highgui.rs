//! OpenCV highgui preview window.

use image::RgbImage;
use opencv::core::{Mat, Vec3b};
use opencv::highgui;
use opencv::prelude::*;

use crate::display::{key_from_code, DisplayError, Key, PreviewWindow};

fn backend(err: opencv::Error) -> DisplayError {
    DisplayError::Backend(err.to_string())
}

/// A named highgui window.
pub struct HighGuiWindow {
    title: String,
    open: bool,
}

impl HighGuiWindow {
    /// Create an auto-sized window.
    pub fn create(title: &str) -> Result<Self, DisplayError> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE).map_err(|err| {
            DisplayError::CreateFailed {
                title: title.to_owned(),
                reason: err.to_string(),
            }
        })?;
        Ok(Self {
            title: title.to_owned(),
            open: true,
        })
    }
}

impl PreviewWindow for HighGuiWindow {
    fn show(&mut self, image: &RgbImage) -> Result<(), DisplayError> {
        // highgui expects BGR.
        let pixels: Vec<Vec3b> = image
            .pixels()
            .map(|p| Vec3b::from_array([p[2], p[1], p[0]]))
            .collect();
        let mat = Mat::from_slice_rows_cols(
            &pixels,
            image.height() as usize,
            image.width() as usize,
        )
        .and_then(|mat| mat.try_clone())
        .map_err(backend)?;
        highgui::imshow(&self.title, &mat).map_err(backend)
    }

    fn poll_key(&mut self) -> Result<Option<Key>, DisplayError> {
        let code = highgui::wait_key(1).map_err(backend)?;
        let visible =
            highgui::get_window_property(&self.title, highgui::WND_PROP_VISIBLE).map_err(backend)?;
        if visible < 1.0 {
            return Ok(Some(Key::Quit));
        }
        Ok(key_from_code(code))
    }

    fn close(&mut self) -> Result<(), DisplayError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        highgui::destroy_all_windows().map_err(backend)
    }
}
