/// Per-frame detector output.
///
/// `cx`/`cy` are the pixel centroid of the target and carry no meaning when
/// `found` is false; read them through `centroid()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Detection {
    pub found: bool,
    pub cx: i32,
    pub cy: i32,
}

impl Detection {
    pub const NOT_FOUND: Detection = Detection {
        found: false,
        cx: 0,
        cy: 0,
    };

    pub fn at(cx: i32, cy: i32) -> Self {
        Self {
            found: true,
            cx,
            cy,
        }
    }

    pub fn centroid(&self) -> Option<(i32, i32)> {
        self.found.then_some((self.cx, self.cy))
    }
}

/// Detection plus the outline it was derived from (for the debug overlay).
#[derive(Clone, Debug, Default)]
pub struct FrameAnalysis {
    pub detection: Detection,
    /// Outline of the selected contour, empty when nothing was selected.
    pub outline: Vec<(i32, i32)>,
    /// Area of the largest external contour, pixels².
    pub largest_area: f64,
}

impl FrameAnalysis {
    pub fn not_found() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_detection_hides_coordinates() {
        let stale = Detection {
            found: false,
            cx: 320,
            cy: 240,
        };
        assert_eq!(stale.centroid(), None);
        assert_eq!(Detection::at(3, 4).centroid(), Some((3, 4)));
        assert_eq!(Detection::default(), Detection::NOT_FOUND);
    }
}
