// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Platform-neutral pointer input.

use inkboard_geom::Vec2;

use crate::viewport::Viewport;

/// The raw device class reported by the host platform.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RawPointerType {
    #[allow(missing_docs)]
    Mouse,
    #[allow(missing_docs)]
    Pen,
    #[allow(missing_docs)]
    Touch,
}

/// The logical input device, derived from type and button state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PointerDevice {
    #[allow(missing_docs)]
    Pen,
    /// A pen with the eraser button held (button flag `0x20`).
    Eraser,
    #[allow(missing_docs)]
    Touch,
    #[allow(missing_docs)]
    PrimaryButtonMouse,
    /// A mouse with the secondary button held (button flag `0x2`).
    RightButtonMouse,
    /// Anything the platform reports that fits no other bucket.
    Other,
}

/// A pointer event as delivered by the host, before viewport mapping.
#[derive(Clone, Copy, Debug)]
pub struct InputPointerRecord {
    /// The raw device class.
    pub pointer_type: RawPointerType,
    /// Platform button flags (`0x1` primary, `0x2` secondary,
    /// `0x20` pen eraser).
    pub buttons: u32,
    /// Position in screen coordinates.
    pub screen_pos: Vec2,
    /// Normalized pressure, when the device reports one.
    pub pressure: Option<f64>,
    /// Whether this is the primary pointer of its type.
    pub is_primary: bool,
    /// A host-assigned id, stable for the duration of a contact.
    pub id: u64,
    /// High-resolution timestamp in milliseconds.
    pub timestamp: f64,
}

/// A pointer sample mapped into canvas space.
#[derive(Clone, Copy, Debug)]
pub struct Pointer {
    #[allow(missing_docs)]
    pub screen_pos: Vec2,
    #[allow(missing_docs)]
    pub canvas_pos: Vec2,
    /// Normalized pressure, when the device reports one.
    pub pressure: Option<f64>,
    #[allow(missing_docs)]
    pub is_primary: bool,
    /// Whether the pointer is currently down.
    pub down: bool,
    #[allow(missing_docs)]
    pub device: PointerDevice,
    #[allow(missing_docs)]
    pub id: u64,
    #[allow(missing_docs)]
    pub timestamp: f64,
}

impl Pointer {
    /// Maps a host pointer record into canvas space.
    ///
    /// `relative_to` shifts screen coordinates by the given origin before
    /// mapping (the position of the canvas within a larger window).
    pub fn from_record(
        record: &InputPointerRecord,
        down: bool,
        viewport: &Viewport,
        relative_to: Option<Vec2>,
    ) -> Pointer {
        let screen_pos = match relative_to {
            Some(origin) => record.screen_pos - origin,
            None => record.screen_pos,
        };

        let device = match record.pointer_type {
            RawPointerType::Pen => {
                if record.buttons & 0x20 != 0 {
                    PointerDevice::Eraser
                } else {
                    PointerDevice::Pen
                }
            }
            RawPointerType::Touch => PointerDevice::Touch,
            RawPointerType::Mouse => {
                if record.buttons & 0x2 != 0 {
                    PointerDevice::RightButtonMouse
                } else {
                    PointerDevice::PrimaryButtonMouse
                }
            }
        };

        Pointer {
            screen_pos,
            canvas_pos: viewport.screen_to_canvas(screen_pos),
            pressure: record.pressure,
            is_primary: record.is_primary,
            down,
            device,
            id: record.id,
            timestamp: record.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_geom::{Mat33, Rect2};

    fn record(pointer_type: RawPointerType, buttons: u32) -> InputPointerRecord {
        InputPointerRecord {
            pointer_type,
            buttons,
            screen_pos: Vec2::new(10.0, 20.0),
            pressure: Some(0.5),
            is_primary: true,
            id: 1,
            timestamp: 100.0,
        }
    }

    #[test]
    fn device_mapping() {
        let viewport = Viewport::default();
        let get = |ty, buttons| {
            Pointer::from_record(&record(ty, buttons), true, &viewport, None).device
        };

        assert_eq!(get(RawPointerType::Pen, 0x1), PointerDevice::Pen);
        assert_eq!(get(RawPointerType::Pen, 0x21), PointerDevice::Eraser);
        assert_eq!(get(RawPointerType::Mouse, 0x1), PointerDevice::PrimaryButtonMouse);
        assert_eq!(get(RawPointerType::Mouse, 0x2), PointerDevice::RightButtonMouse);
        assert_eq!(get(RawPointerType::Touch, 0x0), PointerDevice::Touch);
    }

    #[test]
    fn canvas_position_uses_viewport() {
        let mut viewport = Viewport::new(Rect2::new(0.0, 0.0, 100.0, 100.0));
        viewport.reset_transform(Mat33::scaling_2d(2.0, Vec2::ZERO));

        let pointer = Pointer::from_record(
            &record(RawPointerType::Pen, 0),
            true,
            &viewport,
            Some(Vec2::new(10.0, 10.0)),
        );
        assert_eq!(pointer.screen_pos, Vec2::new(0.0, 10.0));
        assert_eq!(pointer.canvas_pos, Vec2::new(0.0, 5.0));
    }
}
