use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, Criterion,
};
use nalgebra::{Matrix4, Point3};
use relief::{
    render, CancelToken, Derivs, Error, Evaluator, Interval, Voxels,
};

const BATCH: usize = 64;

/// Minimal unit-sphere evaluator, just enough to drive the renderer
struct SphereEval {
    mat: Matrix4<f32>,
    pts: Vec<Point3<f32>>,
    vals: Vec<f32>,
    dx: Vec<f32>,
    dy: Vec<f32>,
    dz: Vec<f32>,
}

impl SphereEval {
    fn new() -> Self {
        Self {
            mat: Matrix4::identity(),
            pts: vec![Point3::origin(); BATCH],
            vals: vec![0.0; BATCH],
            dx: vec![0.0; BATCH],
            dy: vec![0.0; BATCH],
            dz: vec![0.0; BATCH],
        }
    }
}

impl Evaluator for SphereEval {
    const N: usize = BATCH;

    fn set_matrix(&mut self, mat: Matrix4<f32>) {
        self.mat = mat;
    }
    fn set_raw(&mut self, p: Point3<f32>, k: usize) {
        self.pts[k] = p;
    }
    fn set(&mut self, p: Point3<f32>, k: usize) {
        self.pts[k] = self.mat.transform_point(&p);
    }
    fn apply_transform(&mut self, count: usize) {
        for p in &mut self.pts[..count] {
            *p = self.mat.transform_point(p);
        }
    }
    fn values(&mut self, count: usize) -> Result<&[f32], Error> {
        for k in 0..count {
            let p = self.pts[k];
            self.vals[k] = p.x * p.x + p.y * p.y + p.z * p.z - 1.0;
        }
        Ok(&self.vals[..count])
    }
    fn derivs(&mut self, count: usize) -> Result<Derivs<'_>, Error> {
        for k in 0..count {
            let p = self.pts[k];
            self.dx[k] = 2.0 * p.x;
            self.dy[k] = 2.0 * p.y;
            self.dz[k] = 2.0 * p.z;
        }
        Ok(Derivs {
            dx: &self.dx[..count],
            dy: &self.dy[..count],
            dz: &self.dz[..count],
        })
    }
    fn eval(
        &mut self,
        lower: Point3<f32>,
        upper: Point3<f32>,
    ) -> Result<Interval, Error> {
        let x = Interval::new(lower.x, upper.x).square();
        let y = Interval::new(lower.y, upper.y).square();
        let z = Interval::new(lower.z, upper.z).square();
        Ok(x + y + z - Interval::from(1.0))
    }
    fn push(&mut self) {}
    fn pop(&mut self) {}
}

fn cube(res: f32) -> Voxels {
    let i = Interval::new(-2.0, 2.0);
    Voxels::new(i, i, i, res)
}

pub fn sphere_size_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sphere speed vs resolution (4 workers)");
    for res in [8, 16, 32, 64] {
        let v = cube(res as f32);
        group.bench_function(BenchmarkId::new("res", res), |b| {
            b.iter(|| {
                let mut es: Vec<_> = (0..4).map(|_| SphereEval::new()).collect();
                black_box(
                    render(
                        &mut es,
                        &v,
                        &CancelToken::new(),
                        Matrix4::identity(),
                    )
                    .unwrap(),
                )
            })
        });
    }
}

pub fn sphere_worker_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sphere speed vs workers (res 32)");
    let v = cube(32.0);
    for workers in [1, 2, 4, 8] {
        group.bench_function(BenchmarkId::new("workers", workers), |b| {
            b.iter(|| {
                let mut es: Vec<_> =
                    (0..workers).map(|_| SphereEval::new()).collect();
                black_box(
                    render(
                        &mut es,
                        &v,
                        &CancelToken::new(),
                        Matrix4::identity(),
                    )
                    .unwrap(),
                )
            })
        });
    }
}

criterion_group!(benches, sphere_size_sweep, sphere_worker_sweep);
criterion_main!(benches);
