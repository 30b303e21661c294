// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Solid and grid backgrounds. A background auto-sizes to the image's
//! import/export rectangle and always renders below content.

use serde_json::{json, Value};

use inkboard_geom::{Color, Path, PathCommand, Rect2, Vec2};

use crate::command::CommandError;
use crate::component::{Component, ComponentData};
use crate::render::{RenderablePathSpec, Renderer};
use crate::style::{RenderingStyle, StrokeStyle};

/// CSS class marking an element as the image background.
pub const BACKGROUND_CLASS: &str = "js-draw-image-background";
/// Additional class marking a grid background.
pub const BACKGROUND_GRID_CLASS: &str = "js-draw-image-background-grid";
/// Class prefix encoding the grid cell size.
pub const BACKGROUND_GRID_SIZE_CLASS_PREFIX: &str = "js-draw-image-background-grid-size-";

/// Width of grid rule lines, in canvas units.
pub const GRID_STROKE_WIDTH: f64 = 0.7;

/// What the background paints on top of its fill.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum BackgroundKind {
    /// A plain fill.
    SolidColor,
    /// A fill plus grid rules.
    Grid {
        /// Distance between rule lines.
        grid_size: f64,
        /// Rule line color.
        secondary_color: Color,
    },
}

/// The image background component.
#[derive(Clone, Debug)]
pub struct BackgroundComponent {
    pub(crate) data: ComponentData,
    color: Color,
    kind: BackgroundKind,
    region: Rect2,
}

impl BackgroundComponent {
    /// Creates a background covering `region`.
    pub fn new(color: Color, kind: BackgroundKind, region: Rect2) -> Self {
        BackgroundComponent {
            data: ComponentData::new_at_bottom(),
            color,
            kind,
            region,
        }
    }

    /// Creates a grid background with the default contrasting rule color.
    pub fn grid(color: Color, grid_size: f64, region: Rect2) -> Self {
        BackgroundComponent::new(
            color,
            BackgroundKind::Grid {
                grid_size,
                secondary_color: color.contrasting_shade(),
            },
            region,
        )
    }

    /// The main (fill) color.
    #[inline]
    pub fn color(&self) -> Color {
        self.color
    }

    /// Replaces the main color.
    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    /// The background kind.
    #[inline]
    pub fn kind(&self) -> BackgroundKind {
        self.kind
    }

    /// The covered region.
    #[inline]
    pub fn bbox(&self) -> Rect2 {
        self.region
    }

    /// Follows the image's import/export rectangle.
    pub fn set_region(&mut self, region: Rect2) {
        self.region = region;
    }

    /// The grid rule lines covering `region`, snapped to multiples of
    /// the cell size. `None` for solid backgrounds.
    pub fn grid_rule_path(&self, region: Rect2) -> Option<Path> {
        match self.kind {
            BackgroundKind::Grid { grid_size, .. } if grid_size > 0.0 => {
                Some(self.grid_path(grid_size, region))
            }
            _ => None,
        }
    }

    fn grid_path(&self, grid_size: f64, region: Rect2) -> Path {
        let mut commands = Vec::new();

        let right = region.x + region.w;
        let bottom = region.y + region.h;

        let mut x = (region.x / grid_size).floor() * grid_size;
        while x <= right {
            if x >= region.x {
                commands.push(PathCommand::MoveTo(Vec2::new(x, region.y)));
                commands.push(PathCommand::LineTo(Vec2::new(x, bottom)));
            }
            x += grid_size;
        }

        let mut y = (region.y / grid_size).floor() * grid_size;
        while y <= bottom {
            if y >= region.y {
                commands.push(PathCommand::MoveTo(Vec2::new(region.x, y)));
                commands.push(PathCommand::LineTo(Vec2::new(right, y)));
            }
            y += grid_size;
        }

        Path::from_commands(region.top_left(), commands)
    }

    /// Renders the fill and, for grids, the rule lines. Only the part
    /// of the region inside `visible_rect` is ruled.
    pub fn render(&self, renderer: &mut dyn Renderer, visible_rect: Option<&Rect2>) {
        if self.region.is_empty() {
            return;
        }

        renderer.start_object(&self.region, true);

        if !self.color.is_transparent() {
            renderer.draw_path(&RenderablePathSpec {
                path: Path::from_rect(self.region),
                style: RenderingStyle::fill_only(self.color),
            });
        }

        if let BackgroundKind::Grid {
            grid_size,
            secondary_color,
        } = self.kind
        {
            let ruled_region = match visible_rect {
                Some(visible) => match self.region.intersection(visible) {
                    Some(overlap) => overlap,
                    None => {
                        renderer.end_object(Some(&self.data.load_save_data));
                        return;
                    }
                },
                None => self.region,
            };

            if grid_size > 0.0 && ruled_region.max_dimension() / grid_size < 5000.0 {
                renderer.draw_path(&RenderablePathSpec {
                    path: self.grid_path(grid_size, ruled_region),
                    style: RenderingStyle {
                        fill: Color::TRANSPARENT,
                        stroke: Some(StrokeStyle {
                            color: secondary_color,
                            width: GRID_STROKE_WIDTH,
                        }),
                    },
                });
            }
        }

        renderer.end_object(Some(&self.data.load_save_data));
    }

    /// The CSS classes the SVG codec writes for this background.
    pub fn css_classes(&self) -> Vec<String> {
        let mut classes = vec![BACKGROUND_CLASS.to_string()];
        if let BackgroundKind::Grid { grid_size, .. } = self.kind {
            classes.push(BACKGROUND_GRID_CLASS.to_string());
            classes.push(format!(
                "{}{}",
                BACKGROUND_GRID_SIZE_CLASS_PREFIX,
                inkboard_geom::format_coordinate(grid_size)
            ));
        }
        classes
    }

    pub(crate) fn serialize_data(&self) -> Value {
        match self.kind {
            BackgroundKind::SolidColor => json!({
                "mainColor": self.color.to_hex_string(),
                "backgroundType": "solid",
            }),
            BackgroundKind::Grid {
                grid_size,
                secondary_color,
            } => json!({
                "mainColor": self.color.to_hex_string(),
                "backgroundType": "grid",
                "gridSize": grid_size,
                "secondaryColor": secondary_color.to_hex_string(),
            }),
        }
    }
}

pub(crate) fn deserialize(value: &Value) -> Result<Component, CommandError> {
    let invalid = |what: &str| CommandError::InvalidData(format!("background: {}", what));

    let color_text = value
        .get("mainColor")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing mainColor"))?;
    let color = Color::from_string(color_text).map_err(|e| invalid(&e.to_string()))?;

    let kind = match value.get("backgroundType").and_then(Value::as_str) {
        Some("grid") => {
            let grid_size = value
                .get("gridSize")
                .and_then(Value::as_f64)
                .unwrap_or(25.0);
            let secondary_color = match value.get("secondaryColor").and_then(Value::as_str) {
                Some(text) => Color::from_string(text).map_err(|e| invalid(&e.to_string()))?,
                None => color.contrasting_shade(),
            };
            BackgroundKind::Grid {
                grid_size,
                secondary_color,
            }
        }
        _ => BackgroundKind::SolidColor,
    };

    Ok(Component::Background(BackgroundComponent::new(
        color,
        kind,
        Rect2::EMPTY,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::DummyRenderer;
    use crate::viewport::Viewport;
    use inkboard_geom::FuzzyEq;

    #[test]
    fn solid_background_renders_one_fill() {
        let bg = BackgroundComponent::new(
            Color::WHITE,
            BackgroundKind::SolidColor,
            Rect2::new(0.0, 0.0, 100.0, 100.0),
        );
        let mut renderer = DummyRenderer::new(Viewport::default());
        bg.render(&mut renderer, None);
        assert_eq!(renderer.path_count, 1);
    }

    #[test]
    fn grid_background_renders_fill_and_rules() {
        let bg = BackgroundComponent::grid(Color::WHITE, 10.0, Rect2::new(0.0, 0.0, 100.0, 100.0));
        let mut renderer = DummyRenderer::new(Viewport::default());
        bg.render(&mut renderer, None);
        // The fill and the rules have different styles, so two paths.
        assert_eq!(renderer.path_count, 2);
    }

    #[test]
    fn grid_lines_snap_to_cell_size() {
        let bg = BackgroundComponent::grid(Color::WHITE, 10.0, Rect2::new(0.0, 0.0, 100.0, 100.0));
        let path = bg.grid_path(10.0, Rect2::new(5.0, 5.0, 20.0, 20.0));
        // Vertical rules at x = 10, 20; horizontal at y = 10, 20.
        let move_tos: Vec<Vec2> = path
            .commands()
            .iter()
            .filter_map(|c| match c {
                PathCommand::MoveTo(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(move_tos.len(), 4);
        assert!(move_tos.iter().any(|p| (p.x - 10.0).abs() < 1e-9));
        assert!(move_tos.iter().any(|p| (p.y - 20.0).abs() < 1e-9));
    }

    #[test]
    fn grid_roundtrip_preserves_colors_and_size() {
        let bg = BackgroundComponent::new(
            Color::from_string("#336699").unwrap(),
            BackgroundKind::Grid {
                grid_size: 10.0,
                secondary_color: Color::from_string("#aabbcc").unwrap(),
            },
            Rect2::new(0.0, 0.0, 50.0, 50.0),
        );

        let restored = deserialize(&bg.serialize_data()).unwrap();
        match restored {
            Component::Background(restored) => {
                assert!(restored.color().fuzzy_eq(&bg.color()));
                match (restored.kind(), bg.kind()) {
                    (
                        BackgroundKind::Grid {
                            grid_size: a,
                            secondary_color: ca,
                        },
                        BackgroundKind::Grid {
                            grid_size: b,
                            secondary_color: cb,
                        },
                    ) => {
                        assert_eq!(a, b);
                        assert!(ca.fuzzy_eq(&cb));
                    }
                    _ => panic!("expected grid kinds"),
                }
            }
            other => panic!("expected background, got {}", other.kind()),
        }
    }
}
