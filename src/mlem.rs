//! Reference OSEM engine: rotate-and-sum over the rotated-pixel grid.
//!
//! Each pixel centre is rotated by the view angle onto the bin axis and its
//! contribution split linearly between the two nearest bins. Attenuation,
//! detector response and scatter response are not modeled; the staged scatter
//! estimate is added to the forward projection.

use ndarray::azip;

#[cfg(not(feature = "serial"))]
use rayon::prelude::*;

use units::{Angle, radian_};

use crate::engine::{Engine, OnIteration, ReconJob};
use crate::slices::AxisOrder;
use crate::{Error, ImageData, Intensityf32, Result};

#[derive(Clone, Copy, Debug, Default)]
pub struct RotateSum;

/// Shape of the problem, and where each sample lives in the flat buffers
#[derive(Clone, Copy, Debug)]
struct Layout {
    n_pixels: usize,
    n_slices: usize,
    order: AxisOrder,
}

impl Layout {

    fn new(job: &ReconJob) -> Self {
        Self { n_pixels: job.params.n_pixels, n_slices: job.params.n_slices, order: job.options.order }
    }

    fn image_len(&self) -> usize { self.n_pixels * self.n_pixels * self.n_slices }
    fn  view_len(&self) -> usize { self.n_pixels * self.n_slices }

    #[inline]
    fn pixel(&self, x: usize, y: usize, slice: usize) -> usize {
        self.order.index([x, y, slice], self.n_pixels, self.n_slices)
    }

    #[inline]
    fn bin(&self, bin: usize, slice: usize) -> usize { bin + self.n_pixels * slice }
}

/// Call `f(x, y, bin, weight)` for every pixel-bin pair with non-zero weight in
/// a view at `angle`
#[inline]
fn for_each_weight(n: usize, angle: Angle, mut f: impl FnMut(usize, usize, usize, f32)) {
    let centre = (n as f32 - 1.0) / 2.0;
    let (sin, cos) = radian_(angle).sin_cos();
    for y in 0..n {
        let dy = (y as f32 - centre) * sin + centre;
        for x in 0..n {
            let t = (x as f32 - centre) * cos + dy;
            let lower = t.floor();
            let frac = t - lower;
            let lower = lower as i64;
            for (bin, weight) in [(lower, 1.0 - frac), (lower + 1, frac)] {
                if weight > 0.0 && bin >= 0 && (bin as usize) < n {
                    f(x, y, bin as usize, weight)
                }
            }
        }
    }
}

/// Project `image` into the bins of one view
fn forward_project(layout: Layout, angle: Angle, image: &[f32], view: &mut [f32]) {
    view.fill(0.0);
    for_each_weight(layout.n_pixels, angle, |x, y, bin, w| {
        for s in 0..layout.n_slices {
            view[layout.bin(bin, s)] += w * image[layout.pixel(x, y, s)];
        }
    });
}

/// Add one view's bins back into `image`
fn back_project(layout: Layout, angle: Angle, view: &[f32], image: &mut [f32]) {
    for_each_weight(layout.n_pixels, angle, |x, y, bin, w| {
        for s in 0..layout.n_slices {
            image[layout.pixel(x, y, s)] += w * view[layout.bin(bin, s)];
        }
    });
}

fn engine_error(status: i32, message: String) -> Error { Error::Engine { status, message } }

impl RotateSum {

    fn check(&self, job: &ReconJob, image_len: usize, projections_len: usize) -> Result<Layout> {
        let layout = Layout::new(job);
        let n_views = job.params.n_views;
        if image_len != layout.image_len() {
            return Err(engine_error(2, format!(
                "image has {image_len} samples, expected {}", layout.image_len())));
        }
        if projections_len != layout.view_len() * n_views || job.views.len() != n_views {
            return Err(engine_error(2, format!(
                "projections have {projections_len} samples and {} views, expected {} and {n_views}",
                job.views.len(), layout.view_len() * n_views)));
        }
        if let Some(scatter) = &job.scatter {
            if scatter.len() != projections_len {
                return Err(engine_error(2, format!(
                    "scatter estimate has {} samples, expected {projections_len}", scatter.len())));
            }
        }
        let effects = job.options.effects;
        if effects.attenuation || effects.drf || effects.srf {
            log::warn!("RotateSum models geometry only: ignoring requested {effects:?}");
        }
        Ok(layout)
    }

    /// Views of each subset: subset `k` holds every `n_subsets`-th view from `k`
    fn subsets(job: &ReconJob) -> Vec<Vec<usize>> {
        let n_subsets = job.params.n_subsets().max(1);
        (0..n_subsets)
            .map(|k| (k..job.params.n_views).step_by(n_subsets).collect())
            .collect()
    }

    /// Inverted sum of the backprojections of uniform views in `subset`
    fn inverted_sensitivity(layout: Layout, job: &ReconJob, subset: &[usize]) -> ImageData {
        let ones = vec![1.0; layout.view_len()];
        let mut sensitivity = sum_over_views(subset, layout.image_len(), |image, v| {
            back_project(layout, job.views[v].angle, &ones, image)
        });
        sensitivity.iter_mut().for_each(|s| *s = if *s > 0.0 { 1.0 / *s } else { 0.0 });
        sensitivity
    }

    fn one_subset(layout: Layout, job: &ReconJob, projections: &[f32], subset: &[usize], image: &mut ImageData, sensitivity: &[f32]) {
        let view_len = layout.view_len();
        let scatter_scale = job.params.scatter_scale;
        let estimate: &[f32] = image;
        let backprojection = sum_over_views(subset, layout.image_len(), |backprojection, v| {
            let mut ratio = vec![0.0; view_len];
            let angle = job.views[v].angle;
            forward_project(layout, angle, estimate, &mut ratio);
            let measured = &projections[v * view_len .. (v + 1) * view_len];
            let scatter = job.scatter.as_ref().map(|s| &s[v * view_len .. (v + 1) * view_len]);
            for (i, r) in ratio.iter_mut().enumerate() {
                let expected = *r + scatter.map_or(0.0, |s| scatter_scale * s[i]);
                *r = if expected > 0.0 { measured[i] / expected } else { 0.0 };
            }
            back_project(layout, angle, &ratio, backprojection);
        });
        apply_sensitivity_image(image, &backprojection, sensitivity);
    }
}

impl Engine for RotateSum {

    fn osem(&self, job: &ReconJob, projections: &[f32], image: &mut ImageData, on_iteration: &mut OnIteration) -> Result<()> {
        let layout = self.check(job, image.len(), projections.len())?;
        if !job.options.recon_is_initial_estimate {
            image.fill(1.0);
        }
        let subsets = Self::subsets(job);
        let sensitivities: Vec<_> = subsets.iter()
            .map(|subset| Self::inverted_sensitivity(layout, job, subset))
            .collect();
        log::info!("OSEM: {} iterations of {} subsets", job.params.n_iterations, subsets.len());
        for iteration in job.options.start_iteration + 1 ..= job.params.n_iterations {
            for (subset, sensitivity) in subsets.iter().zip(&sensitivities) {
                Self::one_subset(layout, job, projections, subset, image, sensitivity);
            }
            log::debug!("iteration {iteration}: image sum = {:.3}", image.iter().sum::<f32>());
            on_iteration(iteration, image)?;
        }
        Ok(())
    }

    fn project(&self, job: &ReconJob, activity: &[f32], primary_fac: f32, projections: &mut [f32]) -> Result<()> {
        let layout = self.check(job, activity.len(), projections.len())?;
        let view_len = layout.view_len();
        let scatter_scale = job.params.scatter_scale;

        #[cfg    (feature = "serial") ] let views = projections.    chunks_mut(view_len);
        #[cfg(not(feature = "serial"))] let views = projections.par_chunks_mut(view_len);

        views.enumerate().for_each(|(v, view)| {
            forward_project(layout, job.views[v].angle, activity, view);
            view.iter_mut().for_each(|p| *p *= primary_fac);
            if let Some(scatter) = &job.scatter {
                let scatter = &scatter[v * view_len .. (v + 1) * view_len];
                view.iter_mut().zip(scatter).for_each(|(p, s)| *p += scatter_scale * s);
            }
        });
        log::debug!("projection sum = {:.3}", projections.iter().sum::<f32>());
        Ok(())
    }
}

/// Sum, over `views`, of the images produced by `project_one_view`. Each
/// thread accumulates into its own image; these are added at the end.
fn sum_over_views<F>(views: &[usize], len: usize, project_one_view: F) -> ImageData
where
    F: Fn(&mut [f32], usize) + Sync + Send,
{
    let fold_one = |mut image: ImageData, &v: &usize| {
        project_one_view(&mut image, v);
        image
    };

    #[cfg(feature = "serial")]
    let summed = views.iter().fold(vec![0.0; len], fold_one);

    #[cfg(not(feature = "serial"))]
    let summed = views.par_iter()
        .fold(|| vec![0.0; len], fold_one)
        .reduce(|| vec![0.0; len],
                |l, r| l.iter().zip(r.iter()).map(|(l, r)| l + r).collect());

    summed
}

fn apply_sensitivity_image(image: &mut ImageData, backprojection: &[f32], sensitivity: &[Intensityf32]) {
    azip!((voxel in image, &b in backprojection, &s in sensitivity) {
        if s > 0.0 { *voxel *= b * s }
        else       { *voxel  = 0.0   }
    })
}
