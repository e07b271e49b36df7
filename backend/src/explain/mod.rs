//! Gradient-weighted class activation mapping over the network's last
//! convolutional feature map.

pub mod render;

use ndarray::Array2;
use tch::{Kind, Tensor};

use crate::error::AnalyzeError;

/// Feature-map activations and the gradients of the target class score with
/// respect to them, both shaped `[1, C, H, W]`.
pub struct CamCaptures {
    pub activations: Tensor,
    pub gradients: Tensor,
}

/// Single-channel importance grid at the feature map's spatial resolution,
/// normalized to [0, 1].
#[derive(Debug, Clone)]
pub struct Heatmap {
    values: Array2<f32>,
}

impl Heatmap {
    /// Floor negative contributions at zero, then scale by the maximum value.
    /// A uniformly zero grid stays uniformly zero.
    pub fn from_raw(raw: Array2<f32>) -> Self {
        let mut values = raw.mapv(|v| v.max(0.0));
        let max = values.iter().copied().fold(0.0f32, f32::max);
        if max > 0.0 {
            values.mapv_inplace(|v| v / max);
        }
        Self { values }
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }
}

/// Reduce the captures to a heatmap: average the gradients over the spatial
/// dimensions to get one importance weight per channel, take the weighted sum
/// of the feature-map channels, and normalize.
pub fn grad_cam(captures: &CamCaptures) -> Result<Heatmap, AnalyzeError> {
    let weights = captures
        .gradients
        .f_mean_dim([2, 3], false, Kind::Float)?;
    let (_, channels) = weights.size2()?;
    let weights = weights.f_view([1, channels, 1, 1])?;
    let cam = captures
        .activations
        .f_mul(&weights)?
        .f_sum_dim_intlist([1], false, Kind::Float)?;
    let (_, height, width) = cam.size3()?;
    let numel = (height * width) as usize;
    let mut raw = vec![0f32; numel];
    cam.to_device(tch::Device::Cpu)
        .to_kind(Kind::Float)
        .contiguous()
        .view([-1])
        .copy_data(&mut raw, numel);
    let grid = Array2::from_shape_vec((height as usize, width as usize), raw)
        .map_err(|e| AnalyzeError::Render(e.to_string()))?;
    Ok(Heatmap::from_raw(grid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tch::Device;

    #[test]
    fn negative_contributions_are_floored() {
        let heatmap = Heatmap::from_raw(array![[-3.0, 0.0], [0.0, 2.0]]);
        assert_eq!(heatmap.values(), &array![[0.0, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn zero_grid_stays_zero() {
        let heatmap = Heatmap::from_raw(Array2::zeros((7, 7)));
        assert!(heatmap.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn values_are_scaled_to_unit_range() {
        let heatmap = Heatmap::from_raw(array![[1.0, 2.0], [3.0, 4.0]]);
        let max = heatmap.values().iter().copied().fold(0.0f32, f32::max);
        assert_eq!(max, 1.0);
        assert!(heatmap.values().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn all_negative_grid_collapses_to_zero() {
        let heatmap = Heatmap::from_raw(array![[-1.0, -2.0], [-3.0, -4.0]]);
        assert!(heatmap.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn grad_cam_weights_channels_by_pooled_gradients() {
        let opts = (Kind::Float, Device::Cpu);
        // Two channels: constant 1s and constant 2s.
        let c0 = Tensor::ones([1, 1, 2, 2], opts);
        let c1 = Tensor::full([1, 1, 2, 2], 2.0, opts);
        let activations = Tensor::cat(&[c0, c1], 1);
        // Only the first channel carries gradient signal.
        let g0 = Tensor::ones([1, 1, 2, 2], opts);
        let g1 = Tensor::zeros([1, 1, 2, 2], opts);
        let gradients = Tensor::cat(&[g0, g1], 1);

        let heatmap = grad_cam(&CamCaptures {
            activations,
            gradients,
        })
        .unwrap();

        assert_eq!((heatmap.height(), heatmap.width()), (2, 2));
        // cam = 1*1 + 0*2 = 1 everywhere, normalized to 1.
        assert!(heatmap.values().iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn grad_cam_with_zero_gradients_is_all_zero() {
        let opts = (Kind::Float, Device::Cpu);
        let heatmap = grad_cam(&CamCaptures {
            activations: Tensor::ones([1, 4, 3, 3], opts),
            gradients: Tensor::zeros([1, 4, 3, 3], opts),
        })
        .unwrap();
        assert!(heatmap.values().iter().all(|&v| v == 0.0));
    }
}
