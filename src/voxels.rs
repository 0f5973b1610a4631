//! Axis-aligned voxel grids and the sub-box views used during rendering
use nalgebra::{Point3, Vector3};

use crate::interval::Interval;

/// An axis-aligned voxel grid
///
/// The grid stores sample center positions along each axis, plus the voxel
/// footprint bounds covering them. It is built once per render and immutable
/// afterwards; rendering borrows it through [`View`]s.
pub struct Voxels {
    pts: [Vec<f32>; 3],
    bounds: [Interval; 3],
}

impl Voxels {
    /// Builds a grid covering the given bounds at `res` voxels per unit
    ///
    /// Each axis gets `ceil(width * res)` samples, centered in their voxels:
    /// `p[i] = lo + (i + 0.5) / res`. The recorded per-axis bounds are the
    /// inclusive voxel footprint `[lo, lo + n / res]`, which contains every
    /// sample even when `ceil` rounds the count up.
    pub fn new(x: Interval, y: Interval, z: Interval, res: f32) -> Self {
        assert!(res > 0.0, "resolution must be positive");
        let build = |i: Interval| {
            let n = (i.width() * res).ceil() as usize;
            let pts: Vec<f32> = (0..n)
                .map(|k| i.lower() + (k as f32 + 0.5) / res)
                .collect();
            let bounds = Interval::new(i.lower(), i.lower() + n as f32 / res);
            (pts, bounds)
        };
        let (px, bx) = build(x);
        let (py, by) = build(y);
        let (pz, bz) = build(z);
        Self {
            pts: [px, py, pz],
            bounds: [bx, by, bz],
        }
    }

    /// Returns the per-axis sample counts
    pub fn size(&self) -> Vector3<usize> {
        Vector3::new(self.pts[0].len(), self.pts[1].len(), self.pts[2].len())
    }

    /// Checks whether any axis has no samples at all
    pub fn is_empty(&self) -> bool {
        self.pts.iter().any(|p| p.is_empty())
    }

    /// Returns the sample center positions along the X axis
    pub fn xs(&self) -> &[f32] {
        &self.pts[0]
    }

    /// Returns the sample center positions along the Y axis
    pub fn ys(&self) -> &[f32] {
        &self.pts[1]
    }

    /// Returns the sample center positions along the Z axis
    pub fn zs(&self) -> &[f32] {
        &self.pts[2]
    }

    /// Returns a view covering the whole grid
    ///
    /// # Panics
    /// Panics if the grid is empty along any axis; check
    /// [`is_empty`](Voxels::is_empty) first.
    pub fn view(&self) -> View<'_> {
        assert!(!self.is_empty(), "cannot view an empty grid");
        View {
            corner: Vector3::zeros(),
            size: self.size(),
            xs: &self.pts[0],
            ys: &self.pts[1],
            zs: &self.pts[2],
            bounds: self.bounds,
        }
    }
}

/// A sub-box of a [`Voxels`] grid
///
/// Position slices are corner-offset, so `xs[i]` is the sample center of
/// view-local column `i`; slice lengths always equal the matching `size`
/// component. Views are cheap to copy and immutable; subdivision produces
/// fresh views.
#[derive(Copy, Clone, Debug)]
pub struct View<'a> {
    /// Index of the view's lowest corner within the parent grid
    pub corner: Vector3<usize>,
    /// Sample counts along each axis (strictly positive)
    pub size: Vector3<usize>,
    /// Sample center positions along X, starting at the corner
    pub xs: &'a [f32],
    /// Sample center positions along Y, starting at the corner
    pub ys: &'a [f32],
    /// Sample center positions along Z, starting at the corner
    pub zs: &'a [f32],
    bounds: [Interval; 3],
}

impl<'a> View<'a> {
    /// Returns the total number of voxels in the view
    pub fn voxels(&self) -> usize {
        self.size.x * self.size.y * self.size.z
    }

    /// Returns the lower corner of the view's voxel footprint
    ///
    /// These are the bounds used for interval analysis, not the sample-center
    /// extents.
    pub fn lower(&self) -> Point3<f32> {
        Point3::new(
            self.bounds[0].lower(),
            self.bounds[1].lower(),
            self.bounds[2].lower(),
        )
    }

    /// Returns the upper corner of the view's voxel footprint
    pub fn upper(&self) -> Point3<f32> {
        Point3::new(
            self.bounds[0].upper(),
            self.bounds[1].upper(),
            self.bounds[2].upper(),
        )
    }

    /// Bisects the view along its largest axis (ties prefer X, then Y)
    ///
    /// Returns `(low, high)`, where `high` holds the larger-index samples.
    /// The children partition the parent exactly and share no voxels.
    ///
    /// # Panics
    /// Panics if the view is a single voxel
    pub fn split(&self) -> (View<'a>, View<'a>) {
        let mut axis = 0;
        for a in 1..3 {
            if self.size[a] > self.size[axis] {
                axis = a;
            }
        }
        self.split_at(axis)
    }

    /// Bisects the view along its larger X or Y axis (ties prefer X)
    ///
    /// Used to carve XY-disjoint tiles for parallel rendering; Z is never
    /// split here so tiles own whole pixel columns.
    ///
    /// # Panics
    /// Panics if the view is a single voxel wide along both X and Y
    pub fn split_xy(&self) -> (View<'a>, View<'a>) {
        assert!(
            self.size.x > 1 || self.size.y > 1,
            "view cannot be split in XY"
        );
        let axis = usize::from(self.size.y > self.size.x);
        self.split_at(axis)
    }

    fn split_at(&self, axis: usize) -> (View<'a>, View<'a>) {
        let n = self.size[axis];
        assert!(n > 1, "view cannot be split along axis {axis}");
        let half = n / 2;

        // The cut plane sits on the voxel boundary between the halves
        let cut = self.bounds[axis].lerp(half as f32 / n as f32);

        let mut lo = *self;
        lo.size[axis] = half;
        lo.bounds[axis] = Interval::new(self.bounds[axis].lower(), cut);

        let mut hi = *self;
        hi.corner[axis] += half;
        hi.size[axis] = n - half;
        hi.bounds[axis] = Interval::new(cut, self.bounds[axis].upper());

        match axis {
            0 => {
                lo.xs = &self.xs[..half];
                hi.xs = &self.xs[half..];
            }
            1 => {
                lo.ys = &self.ys[..half];
                hi.ys = &self.ys[half..];
            }
            _ => {
                lo.zs = &self.zs[..half];
                hi.zs = &self.zs[half..];
            }
        }
        (lo, hi)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cube(res: f32) -> Voxels {
        let i = Interval::new(-2.0, 2.0);
        Voxels::new(i, i, i, res)
    }

    #[test]
    fn test_voxels_sizing() {
        let v = cube(4.0);
        assert_eq!(v.size(), Vector3::new(16, 16, 16));
        assert!(!v.is_empty());

        assert_eq!(v.xs()[0], -2.0 + 0.5 / 4.0);
        assert_eq!(v.xs()[15], -2.0 + 15.5 / 4.0);

        let view = v.view();
        assert_eq!(view.voxels(), 16 * 16 * 16);
        assert_eq!(view.lower(), Point3::new(-2.0, -2.0, -2.0));
        assert_eq!(view.upper(), Point3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_voxels_empty_axis() {
        let i = Interval::new(-2.0, 2.0);
        let v = Voxels::new(Interval::new(0.0, 0.0), i, i, 4.0);
        assert!(v.is_empty());
        assert_eq!(v.size().x, 0);
    }

    #[test]
    fn test_split_partition() {
        let v = cube(4.0);
        let (lo, hi) = v.view().split();

        // Ties prefer X
        assert_eq!(lo.corner, Vector3::new(0, 0, 0));
        assert_eq!(lo.size, Vector3::new(8, 16, 16));
        assert_eq!(hi.corner, Vector3::new(8, 0, 0));
        assert_eq!(hi.size, Vector3::new(8, 16, 16));

        // The cut plane is shared and sits on a voxel boundary
        assert_eq!(lo.upper().x, 0.0);
        assert_eq!(hi.lower().x, 0.0);
        assert_eq!(lo.xs.len(), 8);
        assert_eq!(hi.xs[0], v.xs()[8]);

        // Z is the largest remaining axis after two X/Y cuts
        let (a, _) = lo.split();
        assert_eq!(a.size, Vector3::new(8, 8, 16));
        let (b, _) = a.split();
        assert_eq!(b.size, Vector3::new(8, 8, 8));
    }

    #[test]
    fn test_split_xy_ignores_z() {
        let i = Interval::new(-2.0, 2.0);
        let v = Voxels::new(
            Interval::new(-1.0, 1.0),
            Interval::new(-1.0, 1.0),
            i,
            4.0,
        );
        assert_eq!(v.size(), Vector3::new(8, 8, 16));

        let (lo, hi) = v.view().split_xy();
        assert_eq!(lo.size, Vector3::new(4, 8, 16));
        assert_eq!(hi.size, Vector3::new(4, 8, 16));
        assert_eq!(hi.corner.x, 4);
    }

    #[test]
    #[should_panic]
    fn test_split_xy_single_column() {
        let v = Voxels::new(
            Interval::new(0.0, 1.0),
            Interval::new(0.0, 1.0),
            Interval::new(0.0, 4.0),
            1.0,
        );
        assert_eq!(v.size(), Vector3::new(1, 1, 4));
        v.view().split_xy();
    }

    #[test]
    fn test_split_odd() {
        let v = Voxels::new(
            Interval::new(0.0, 5.0),
            Interval::new(0.0, 1.0),
            Interval::new(0.0, 1.0),
            1.0,
        );
        let (lo, hi) = v.view().split();
        assert_eq!(lo.size.x, 2);
        assert_eq!(hi.size.x, 3);
        assert_eq!(lo.size.x + hi.size.x, 5);
        assert_eq!(hi.corner.x, 2);
        assert_eq!(lo.upper().x, hi.lower().x);
    }
}
