//! Depth and normal rasterization by hierarchical spatial subdivision
//!
//! The renderer recurses over sub-boxes of the voxel grid, pruning blocks
//! that interval arithmetic proves entirely inside or outside, visiting the
//! high-z half first so the visible shell occludes the interior, and
//! rasterizing sufficiently small blocks in a single evaluator batch.
use std::collections::VecDeque;

use log::debug;
use nalgebra::{Matrix4, Point3, Vector2};

use crate::{
    eval::Evaluator,
    image::{DepthImage, NormalImage},
    render::CancelToken,
    voxels::{View, Voxels},
    Error,
};

/// Distinguished normal for pixels saturated at the top of the grid
///
/// Unpacking this word does not yield +Z; the value is kept bit-compatible
/// with existing consumers, which match on the pattern.
const SKY_NORMAL: u32 = 0xffff7f7f;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Status {
    Done,
    Aborted,
}

////////////////////////////////////////////////////////////////////////////////

/// Queue of surface points awaiting a batched gradient evaluation
///
/// Pixel coordinates are recorded tile-locally while the matching 3D points
/// are staged into the evaluator, so one `derivs` call covers the whole
/// queue when it fills up or is flushed.
struct NormalRenderer {
    origin: Vector2<usize>,
    xs: Vec<usize>,
    ys: Vec<usize>,
    count: usize,
}

impl NormalRenderer {
    fn new(capacity: usize, origin: Vector2<usize>) -> Self {
        Self {
            origin,
            xs: vec![0; capacity],
            ys: vec![0; capacity],
            count: 0,
        }
    }

    /// Queues the pixel at view-local `(i, j)` with its surface z
    ///
    /// The 3D point is staged through [`Evaluator::set`], so the installed
    /// transform applies.
    fn push<E: Evaluator>(
        &mut self,
        e: &mut E,
        v: &View,
        norm: &mut NormalImage,
        i: usize,
        j: usize,
        z: f32,
    ) -> Result<(), Error> {
        self.xs[self.count] = v.corner.x + i - self.origin.x;
        self.ys[self.count] = v.corner.y + j - self.origin.y;
        e.set(Point3::new(v.xs[i], v.ys[j], z), self.count);
        self.count += 1;

        // A full queue triggers a gradient batch and a blit to the image
        if self.count == self.xs.len() {
            self.run(e, norm)?;
        }
        Ok(())
    }

    /// Evaluates gradients for every queued point and blits packed normals
    fn run<E: Evaluator>(
        &mut self,
        e: &mut E,
        norm: &mut NormalImage,
    ) -> Result<(), Error> {
        // Clear the queue up front, so an evaluator error can't strand
        // entries past the enclosing scope
        let n = std::mem::take(&mut self.count);

        let ds = e.derivs(n)?;
        for k in 0..n {
            norm[(self.ys[k], self.xs[k])] =
                pack_normal(ds.dx[k], ds.dy[k], ds.dz[k]);
        }
        Ok(())
    }

    fn flush<E: Evaluator>(
        &mut self,
        e: &mut E,
        norm: &mut NormalImage,
    ) -> Result<(), Error> {
        if self.count > 0 {
            self.run(e, norm)?;
        }
        Ok(())
    }
}

impl Drop for NormalRenderer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert_eq!(
                self.count, 0,
                "normal queue dropped with {} pending points",
                self.count
            );
        }
    }
}

/// Packs a gradient into little-endian `[nx, ny, nz, 0xFF]` byte lanes
///
/// A zero-length gradient is treated as +Z so the scaling below cannot
/// produce NaN.
fn pack_normal(dx: f32, dy: f32, dz: f32) -> u32 {
    let len = (dx * dx + dy * dy + dz * dz).sqrt();
    let (dx, dy, dz) = if len == 0.0 {
        (0.0, 0.0, 1.0)
    } else {
        (dx / len, dy / len, dz / len)
    };

    // Scale each component into the 0-255 range
    let nx = (255.0 * (dx / 2.0 + 0.5)) as u32;
    let ny = (255.0 * (dy / 2.0 + 0.5)) as u32;
    let nz = (255.0 * (dz / 2.0 + 0.5)) as u32;

    0xff000000 | (nz << 16) | (ny << 8) | nx
}

////////////////////////////////////////////////////////////////////////////////

/// Per-tile render state
///
/// Each worker owns the images for one XY tile of the grid; the driver
/// composites them after the join, so no two threads ever write the same
/// pixel.
struct Worker {
    origin: Vector2<usize>,
    depth: DepthImage,
    norm: NormalImage,

    /// Field values for the current leaf batch, copied out of the evaluator
    /// so it can be restaged for gradient work during extraction
    out: Vec<f32>,
}

impl Worker {
    fn new(batch: usize, origin: Vector2<usize>, size: Vector2<usize>) -> Self {
        let mut depth = DepthImage::new(size.x, size.y);
        depth.fill(f32::NEG_INFINITY);
        Self {
            origin,
            depth,
            norm: NormalImage::new(size.x, size.y),
            out: vec![0.0; batch],
        }
    }

    /// Maps a view-local voxel column to a `(row, col)` pixel in this tile
    fn pixel(&self, v: &View, i: usize, j: usize) -> (usize, usize) {
        (
            v.corner.y + j - self.origin.y,
            v.corner.x + i - self.origin.x,
        )
    }

    /// Renders a view by subdivision
    ///
    /// Returns [`Status::Aborted`] as soon as the cancel token is observed
    /// set; evaluator push/pop stays balanced on every path out.
    fn recurse<E: Evaluator>(
        &mut self,
        e: &mut E,
        v: &View,
        cancel: &CancelToken,
    ) -> Result<Status, Error> {
        if cancel.is_cancelled() {
            return Ok(Status::Aborted);
        }

        // If every pixel under this block is already at or above the block's
        // top sample, nothing inside it can contribute
        let top = v.zs[v.size.z - 1];
        if (0..v.size.y).all(|j| {
            (0..v.size.x).all(|i| self.depth[self.pixel(v, i, j)] >= top)
        }) {
            return Ok(Status::Done);
        }

        // Below the batch size, render voxel-by-voxel
        if v.voxels() <= E::N {
            self.pixels(e, v)?;
            return Ok(Status::Done);
        }

        let out = e.eval(v.lower(), v.upper())?;
        if out.upper() < 0.0 {
            // Strictly inside: flood the block without field evaluation
            self.fill(e, v)?;
        } else if out.lower() <= 0.0 {
            // Ambiguous: subdivide under a pruned tree
            e.push();
            let (lo, hi) = v.split();

            // The higher half occludes the lower one wherever the split is
            // along Z, so visit it first
            match self.recurse(e, &hi, cancel) {
                Ok(Status::Done) => (),
                r => {
                    e.pop();
                    return r;
                }
            }
            let r = self.recurse(e, &lo, cancel);
            e.pop();
            return r;
        }
        // Entirely outside: nothing to draw
        Ok(Status::Done)
    }

    /// Rasterizes a leaf block in a single evaluator batch
    fn pixels<E: Evaluator>(
        &mut self,
        e: &mut E,
        v: &View,
    ) -> Result<(), Error> {
        assert!(
            v.voxels() <= E::N,
            "leaf of {} voxels exceeds batch capacity {}",
            v.voxels(),
            E::N
        );

        let top = v.zs[v.size.z - 1];
        let mut index = 0;

        // Flatten the block in a fixed order, highest z first within each
        // column; extraction below replays the same order. Columns already
        // at or above the block's top are skipped entirely.
        for i in 0..v.size.x {
            for j in 0..v.size.y {
                if self.depth[self.pixel(v, i, j)] >= top {
                    continue;
                }
                for k in 0..v.size.z {
                    let p = Point3::new(
                        v.xs[i],
                        v.ys[j],
                        v.zs[v.size.z - 1 - k],
                    );
                    e.set_raw(p, index);
                    index += 1;
                }
            }
        }
        e.apply_transform(index);

        // Copy the batch results out of the evaluator, freeing it up to be
        // restaged with gradient points during extraction
        let values = e.values(index)?;
        self.out[..index].copy_from_slice(values);

        let mut nr = NormalRenderer::new(E::N, self.origin);
        let mut index = 0;
        for i in 0..v.size.x {
            for j in 0..v.size.y {
                let pixel = self.pixel(v, i, j);
                if self.depth[pixel] >= top {
                    continue;
                }
                for k in 0..v.size.z {
                    let value = self.out[index];
                    index += 1;
                    if value < 0.0 {
                        let z = v.zs[v.size.z - 1 - k];
                        if self.depth[pixel] < z {
                            self.depth[pixel] = z;
                            nr.push(e, v, &mut self.norm, i, j, z)?;
                        }
                        // Everything deeper in this column is behind the
                        // hit, so skip the cursor past it
                        index += v.size.z - 1 - k;
                        break;
                    }
                }
            }
        }
        nr.flush(e, &mut self.norm)
    }

    /// Floods the view's top plane into every visible pixel of its footprint
    ///
    /// Used when interval analysis has proved the whole block inside the
    /// solid; only gradients need evaluating.
    fn fill<E: Evaluator>(&mut self, e: &mut E, v: &View) -> Result<(), Error> {
        let z = v.zs[v.size.z - 1];

        let mut nr = NormalRenderer::new(E::N, self.origin);
        for i in 0..v.size.x {
            for j in 0..v.size.y {
                let pixel = self.pixel(v, i, j);
                if self.depth[pixel] < z {
                    self.depth[pixel] = z;
                    nr.push(e, v, &mut self.norm, i, j, z)?;
                }
            }
        }
        nr.flush(e, &mut self.norm)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Renders a voxel grid into freshly allocated depth and normal images
///
/// The grid is carved into XY-disjoint tiles, one per evaluator, and tiles
/// are rendered on parallel threads; each evaluator is exclusively owned by
/// its tile's thread for the duration. The transform is installed on every
/// used evaluator and applied to all evaluation inputs.
///
/// Returns [`Error::Cancelled`] if the token was observed set, and
/// propagates evaluator failures verbatim.
pub fn render<E: Evaluator + Send>(
    evaluators: &mut [E],
    voxels: &Voxels,
    cancel: &CancelToken,
    mat: Matrix4<f32>,
) -> Result<(DepthImage, NormalImage), Error> {
    let size = voxels.size();
    let mut depth = DepthImage::new(size.x, size.y);
    let mut norm = NormalImage::new(size.x, size.y);
    render_into(evaluators, voxels, cancel, mat, &mut depth, &mut norm)?;
    Ok((depth, norm))
}

/// In-place variant of [`render`]
///
/// `depth` and `norm` must already be sized to the grid's XY footprint. On
/// cancellation the buffers hold whatever pixels were completed; callers
/// treating a cancelled render as invalid must discard both.
///
/// # Panics
/// Panics if either buffer does not match the grid's XY size
pub fn render_into<E: Evaluator + Send>(
    evaluators: &mut [E],
    voxels: &Voxels,
    cancel: &CancelToken,
    mat: Matrix4<f32>,
    depth: &mut DepthImage,
    norm: &mut NormalImage,
) -> Result<(), Error> {
    let size = voxels.size();
    assert_eq!(depth.width(), size.x, "depth buffer width mismatch");
    assert_eq!(depth.height(), size.y, "depth buffer height mismatch");
    assert_eq!(norm.width(), size.x, "normal buffer width mismatch");
    assert_eq!(norm.height(), size.y, "normal buffer height mismatch");

    if evaluators.is_empty() {
        return Err(Error::EmptyPool);
    }

    depth.fill(f32::NEG_INFINITY);
    norm.fill(0);

    // A grid with no samples along some axis is an empty, valid render
    if voxels.is_empty() {
        return Ok(());
    }

    // Carve the grid into XY-disjoint tiles, one per evaluator (fewer if
    // the footprint runs out of pixels to split)
    let mut tiles = VecDeque::new();
    tiles.push_back(voxels.view());
    while tiles.len() < evaluators.len()
        && tiles
            .front()
            .is_some_and(|t| t.size.x.min(t.size.y) > 1)
    {
        let t = tiles.pop_front().unwrap();
        let (lo, hi) = t.split_xy();
        tiles.push_back(lo);
        tiles.push_back(hi);
    }
    debug!(
        "rendering {} tiles across {} evaluators",
        tiles.len(),
        evaluators.len()
    );

    let results: Vec<Result<(Worker, Status), Error>> =
        std::thread::scope(|s| {
            let mut handles = Vec::with_capacity(tiles.len());
            for (e, tile) in evaluators.iter_mut().zip(tiles) {
                e.set_matrix(mat);
                handles.push(s.spawn(
                    move || -> Result<(Worker, Status), Error> {
                        let mut w = Worker::new(
                            E::N,
                            Vector2::new(tile.corner.x, tile.corner.y),
                            Vector2::new(tile.size.x, tile.size.y),
                        );
                        let status = w.recurse(e, &tile, cancel)?;
                        Ok((w, status))
                    },
                ));
            }
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

    // Composite the tiles in work-list order; tiles are XY-disjoint, so
    // every pixel comes from exactly one worker
    let mut aborted = false;
    for r in results {
        let (w, status) = r?;
        aborted |= status == Status::Aborted;
        for row in 0..w.depth.height() {
            for col in 0..w.depth.width() {
                let pos = (w.origin.y + row, w.origin.x + col);
                depth[pos] = w.depth[(row, col)];
                norm[pos] = w.norm[(row, col)];
            }
        }
    }

    // Pixels saturated at the top of the grid get the sky normal
    let top = *voxels.zs().last().unwrap();
    for (d, n) in depth.iter().zip(norm.iter_mut()) {
        if *d == top {
            *n = SKY_NORMAL;
        }
    }

    if aborted {
        return Err(Error::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pack_normal() {
        // +Z packs to the same word as the sky sentinel
        assert_eq!(pack_normal(0.0, 0.0, 1.0), 0xffff7f7f);

        // Gradient length doesn't matter, only direction
        assert_eq!(pack_normal(0.0, 0.0, 17.5), 0xffff7f7f);

        // +X saturates the low lane
        assert_eq!(pack_normal(1.0, 0.0, 0.0), 0xff7f7fff);

        // -X empties it
        assert_eq!(pack_normal(-2.0, 0.0, 0.0), 0xff7f7f00);

        // +Y fills the second lane
        assert_eq!(pack_normal(0.0, 3.0, 0.0), 0xff7fff7f);
    }

    #[test]
    fn test_pack_normal_zero_gradient() {
        // A zero gradient falls back to +Z rather than producing NaN lanes
        assert_eq!(pack_normal(0.0, 0.0, 0.0), 0xffff7f7f);
    }
}
