use ndarray::*;

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// Returns a new Point
    pub fn new(x: f32, y: f32) -> Point {
        Point { x, y }
    }

    /// Returns the Euclidean distance to `other` in pixels.
    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Returns the point as a `(x, y)` array.
    pub fn to_xy(&self) -> Array1<f32> {
        arr1::<f32>(&[self.x, self.y])
    }
}

/// BoundingBox represents the axis-aligned rectangle of a detection.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    /// Left of the bounding box (i.e. min-x)
    x: f32,
    /// Top of the bounding box (i.e. min-y)
    y: f32,
    /// Width of the bounding box
    width: f32,
    /// Height of the bounding box
    height: f32,
}

impl PartialEq for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
    }
}

impl BoundingBox {
    /// Returns a new BoundingBox
    ///
    /// # Parameters
    ///
    /// * `x`: Bounding box left.
    /// * `y`: Bounding box top.
    /// * `width`: Bounding box width.
    /// * `height`: Bounding box height.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the x of the bounding box
    pub fn x(&self) -> f32 {
        self.x
    }

    /// Returns the y of the bounding box
    pub fn y(&self) -> f32 {
        self.y
    }

    /// Returns the width of the bounding box
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Returns the height of the bounding box
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Returns the centroid of the bounding box, i.e. `(x + width / 2, y + height / 2)`.
    pub fn center(&self) -> Point {
        Point::new(self.x + (self.width / 2.0), self.y + (self.height / 2.0))
    }

    /// Returns the bounding box in left, top, width, height format, i.e., `(min x, min y, width, height)`.
    pub fn to_tlwh(&self) -> Array1<f32> {
        arr1::<f32>(&[self.x, self.y, self.width, self.height])
    }

    /// Returns the integer region `(x, y, width, height)` of the bounding box clipped to an image of
    /// `image_width` x `image_height` pixels, or `None` if nothing of the box lies inside the image.
    pub fn to_region(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0.0).floor();
        let y0 = self.y.max(0.0).floor();
        let x1 = (self.x + self.width).min(image_width as f32).ceil();
        let y1 = (self.y + self.height).min(image_height as f32).ceil();

        if x1 <= x0 || y1 <= y0 {
            None
        } else {
            Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::*;

    #[test]
    fn to_tlwh() {
        let bbox = BoundingBox::new(1.0, 2.0, 13.0, 4.0);
        assert_eq!(bbox.to_tlwh(), arr1::<f32>(&[1.0, 2.0, 13.0, 4.0]));
    }

    #[test]
    fn center() {
        let bbox = BoundingBox::new(1.0, 2.0, 13.0, 4.0);
        assert_eq!(bbox.center(), Point::new(7.5, 4.0));
    }

    #[test]
    fn distance() {
        let a = Point::new(100.0, 100.0);
        let b = Point::new(103.0, 104.0);
        assert_approx_eq!(a.distance(&b), 5.0);
        assert_approx_eq!(b.distance(&a), 5.0);
    }

    #[test]
    fn to_region_clips_to_image() {
        let bbox = BoundingBox::new(-10.0, 5.5, 40.0, 200.0);
        assert_eq!(bbox.to_region(100, 100), Some((0, 5, 30, 95)));
    }

    #[test]
    fn to_region_outside_image() {
        let bbox = BoundingBox::new(120.0, 10.0, 20.0, 20.0);
        assert_eq!(bbox.to_region(100, 100), None);
    }
}
